//! Vendor runtimes a device can belong to.

use std::fmt;

bitflags::bitflags! {
    /// Set of GPU runtimes.
    ///
    /// A device record always carries exactly one flag. As a filter, the empty
    /// set ([`Provider::any`]) matches every device.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct Provider: u32 {
        /// NVIDIA CUDA driver API.
        const CUDA = 1;
        /// AMD ROCm HIP runtime.
        const HIP = 2;
    }
}

impl Provider {
    /// Filter that does not restrict the provider.
    pub const fn any() -> Self {
        Self::empty()
    }

    /// Short vendor name stored in device records.
    ///
    /// Returns `None` unless `self` is a single flag.
    pub fn name(self) -> Option<&'static str> {
        if self == Self::CUDA {
            Some("CUDA")
        } else if self == Self::HIP {
            Some("HIP")
        } else {
            None
        }
    }

    /// Parse a single provider name, ignoring case.
    pub fn parse_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("cuda") {
            Some(Self::CUDA)
        } else if name.eq_ignore_ascii_case("hip") || name.eq_ignore_ascii_case("amd") {
            Some(Self::HIP)
        } else {
            None
        }
    }

    /// Whether a device owned by `owner` passes this filter.
    pub fn admits(self, owner: Self) -> bool {
        self.is_empty() || self.contains(owner)
    }

    /// Expand a filter: the empty set stands for every provider.
    pub fn or_all(self) -> Self {
        if self.is_empty() {
            Self::all()
        } else {
            self
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("ANY");
        }
        let mut first = true;
        for flag in self.iter() {
            if !first {
                f.write_str("|")?;
            }
            first = false;
            f.write_str(flag.name().unwrap_or("?"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Provider::CUDA.to_string(), "CUDA");
        assert_eq!(Provider::HIP.to_string(), "HIP");
        assert_eq!(Provider::all().to_string(), "CUDA|HIP");
        assert_eq!(Provider::any().to_string(), "ANY");
    }

    #[test]
    fn test_filters() {
        assert!(Provider::any().admits(Provider::CUDA));
        assert!(Provider::any().admits(Provider::HIP));
        assert!(Provider::CUDA.admits(Provider::CUDA));
        assert!(!Provider::CUDA.admits(Provider::HIP));
        assert!(Provider::all().admits(Provider::HIP));
        assert_eq!(Provider::any().or_all(), Provider::all());
        assert_eq!(Provider::HIP.or_all(), Provider::HIP);
    }

    #[test]
    fn test_names() {
        assert_eq!(Provider::parse_name("cuda"), Some(Provider::CUDA));
        assert_eq!(Provider::parse_name("HIP"), Some(Provider::HIP));
        assert_eq!(Provider::parse_name("amd"), Some(Provider::HIP));
        assert_eq!(Provider::parse_name("opencl"), None);
        assert_eq!(Provider::all().name(), None);
    }
}
