//! Normalized, vendor-independent device property record.
//!
//! [`DeviceProps`] has a fixed layout so it can be handed across an FFI
//! boundary as-is. Strings are stored inline in [`FixedCStr`] buffers that are
//! always NUL-terminated; longer input is truncated on a character boundary.
//! Numeric fields keep the units reported by the driver.

use std::ffi::CStr;
use std::fmt;

use crate::provider::Provider;

/// Inline, NUL-terminated UTF-8 string with `N` bytes of storage.
///
/// At most `N - 1` bytes of text are kept.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct FixedCStr<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> FixedCStr<N> {
    /// Maximum text length in bytes.
    pub const CAPACITY: usize = N - 1;

    /// Copy `text`, truncating it to [`Self::CAPACITY`] bytes.
    ///
    /// Truncation never splits a multi-byte character. Anything after an
    /// embedded NUL is dropped.
    pub fn new(text: &str) -> Self {
        let text = text.split('\0').next().unwrap_or_default();
        let mut end = text.len().min(Self::CAPACITY);
        while !text.is_char_boundary(end) {
            end -= 1;
        }

        let mut bytes = [0u8; N];
        bytes[..end].copy_from_slice(&text.as_bytes()[..end]);
        Self { bytes }
    }

    /// Build from a raw, possibly unterminated driver buffer.
    ///
    /// Bytes up to the first NUL are taken; invalid UTF-8 is replaced.
    pub fn from_raw(raw: &[u8]) -> Self {
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Self::new(&String::from_utf8_lossy(&raw[..end]))
    }

    /// Length of the stored text in bytes.
    pub fn len(&self) -> usize {
        self.bytes.iter().position(|&b| b == 0).unwrap_or(Self::CAPACITY)
    }

    /// Whether the stored text is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored text.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes[..self.len()]).unwrap_or_default()
    }

    /// Stored text including its terminator.
    pub fn as_c_str(&self) -> &CStr {
        CStr::from_bytes_until_nul(&self.bytes).unwrap_or_default()
    }
}

impl<const N: usize> Default for FixedCStr<N> {
    fn default() -> Self {
        Self { bytes: [0u8; N] }
    }
}

impl<const N: usize> fmt::Debug for FixedCStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl<const N: usize> fmt::Display for FixedCStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<const N: usize> From<&str> for FixedCStr<N> {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

#[cfg(feature = "serde")]
impl<const N: usize> serde::Serialize for FixedCStr<N> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(feature = "serde")]
impl<'de, const N: usize> serde::Deserialize<'de> for FixedCStr<N> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        Ok(Self::new(&text))
    }
}

/// Storage for the vendor name (`"CUDA"`, `"HIP"`).
pub type ProviderName = FixedCStr<8>;

/// Storage for the device marketing name.
pub type DeviceName = FixedCStr<256>;

/// Properties of one GPU, normalized across vendors.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceProps {
    /// Position in the merged enumeration across all vendors.
    pub ordinal: usize,
    /// Owning runtime.
    pub provider: Provider,
    /// Owning runtime name.
    pub provider_name: ProviderName,
    /// Index within the owning runtime.
    pub index: usize,
    /// Device name as reported by the driver.
    pub name: DeviceName,
    /// Compute capability, major part.
    pub major: i32,
    /// Compute capability, minor part.
    pub minor: i32,
    /// Global memory in bytes.
    pub total_memory: usize,
    /// Number of multiprocessors (compute units on AMD).
    pub sms_count: i32,
    /// Maximum resident threads per multiprocessor.
    pub sm_threads: i32,
    /// Shared memory per multiprocessor, in bytes.
    pub sm_shared_memory: usize,
    /// 32-bit registers per multiprocessor.
    pub sm_registers: i32,
    /// Maximum resident blocks per multiprocessor.
    pub sm_blocks: i32,
    /// Maximum threads per block.
    pub block_threads: i32,
    /// Shared memory per block, in bytes.
    pub block_shared_memory: usize,
    /// 32-bit registers per block.
    pub block_registers: i32,
    /// Warp (wavefront) size.
    pub warp_size: i32,
    /// L2 cache size in bytes.
    pub l2_cache_size: i32,
    /// Whether kernels from different streams may run concurrently.
    pub concurrent_kernels: bool,
    /// Number of asynchronous copy engines.
    pub async_engines_count: i32,
    /// Whether cooperative launches are supported.
    pub cooperative: bool,
}

impl DeviceProps {
    /// Empty record tagged with `provider`.
    pub fn empty(provider: Provider) -> Self {
        Self {
            ordinal: 0,
            provider,
            provider_name: ProviderName::new(provider.name().unwrap_or_default()),
            index: 0,
            name: DeviceName::default(),
            major: 0,
            minor: 0,
            total_memory: 0,
            sms_count: 0,
            sm_threads: 0,
            sm_shared_memory: 0,
            sm_registers: 0,
            sm_blocks: 0,
            block_threads: 0,
            block_shared_memory: 0,
            block_registers: 0,
            warp_size: 0,
            l2_cache_size: 0,
            concurrent_kernels: false,
            async_engines_count: 0,
            cooperative: false,
        }
    }

    /// Retag the record for another provider, keeping every hardware field.
    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = provider;
        self.provider_name = ProviderName::new(provider.name().unwrap_or_default());
        self
    }

    /// Whether `other` describes the same kind of hardware.
    ///
    /// Every field except the ordinal and the index is compared.
    pub fn same_hardware(&self, other: &Self) -> bool {
        let strip = |props: &Self| Self {
            ordinal: 0,
            index: 0,
            ..*props
        };
        strip(self) == strip(other)
    }

    /// Compute capability as `"major.minor"`.
    pub fn compute_capability(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }

    /// Field names and rendered values, in declaration order.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("ord", self.ordinal.to_string()),
            ("provider", self.provider_name.to_string()),
            ("index", self.index.to_string()),
            ("name", self.name.to_string()),
            ("major", self.major.to_string()),
            ("minor", self.minor.to_string()),
            ("total_memory", self.total_memory.to_string()),
            ("sms_count", self.sms_count.to_string()),
            ("sm_threads", self.sm_threads.to_string()),
            ("sm_shared_memory", self.sm_shared_memory.to_string()),
            ("sm_registers", self.sm_registers.to_string()),
            ("sm_blocks", self.sm_blocks.to_string()),
            ("block_threads", self.block_threads.to_string()),
            ("block_shared_memory", self.block_shared_memory.to_string()),
            ("block_registers", self.block_registers.to_string()),
            ("warp_size", self.warp_size.to_string()),
            ("l2_cache_size", self.l2_cache_size.to_string()),
            ("concurrent_kernels", self.concurrent_kernels.to_string()),
            ("async_engines_count", self.async_engines_count.to_string()),
            ("cooperative", self.cooperative.to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_fixed_str_truncates() {
        let name = FixedCStr::<8>::new("Radeon Instinct");
        assert_eq!(name.as_str(), "Radeon ");
        assert_eq!(name.len(), FixedCStr::<8>::CAPACITY);
        assert_eq!(name.as_c_str().to_bytes(), b"Radeon ");
    }

    #[test]
    fn test_fixed_str_char_boundary() {
        // "é" is two bytes; the cut must fall before it.
        let name = FixedCStr::<4>::new("abé");
        assert_eq!(name.as_str(), "ab");
        let name = FixedCStr::<5>::new("abé");
        assert_eq!(name.as_str(), "abé");
    }

    #[test]
    fn test_fixed_str_from_raw() {
        let mut raw = [0u8; 16];
        raw[..6].copy_from_slice(b"GA100\0");
        raw[6] = b'x';
        assert_eq!(DeviceName::from_raw(&raw).as_str(), "GA100");

        let unterminated = [b'A'; 300];
        let name = DeviceName::from_raw(&unterminated);
        assert_eq!(name.len(), 255);

        let invalid = [0xff, b'b', 0];
        assert_eq!(FixedCStr::<8>::from_raw(&invalid).as_str(), "\u{fffd}b");
    }

    #[test]
    fn test_same_hardware_ignores_indices() {
        let mut a = DeviceProps::empty(Provider::CUDA);
        a.name = DeviceName::new("A100");
        a.total_memory = 40 << 30;
        let mut b = a;
        b.ordinal = 3;
        b.index = 1;
        assert!(a.same_hardware(&b));

        let c = a.with_provider(Provider::HIP);
        assert!(!a.same_hardware(&c));
        assert_eq!(c.provider_name.as_str(), "HIP");
    }

    #[test]
    fn test_fields_order() {
        let props = DeviceProps::empty(Provider::HIP);
        let names: Vec<_> = props.fields().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names.first(), Some(&"ord"));
        assert_eq!(names.last(), Some(&"cooperative"));
        assert_eq!(names.len(), 20);
    }

    proptest! {
        #[test]
        fn prop_fixed_str_is_bounded_prefix(text in "\\PC{0,80}") {
            let fixed = FixedCStr::<32>::new(&text);
            prop_assert!(fixed.len() <= 31);
            prop_assert!(text.starts_with(fixed.as_str()));
            prop_assert_eq!(fixed.as_c_str().to_bytes(), fixed.as_str().as_bytes());
        }
    }
}
