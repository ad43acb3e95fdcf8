//! Process-level device visibility.
//!
//! CUDA and HIP hide devices that are not listed in `CUDA_VISIBLE_DEVICES`
//! and `HIP_VISIBLE_DEVICES`, and renumber the remaining ones. To report the
//! whole machine while still knowing which devices this process can use, the
//! variables are parsed up front and then removed while the drivers enumerate
//! (see [`SystemViewGuard`]).

use std::ffi::OsString;

use crate::error::{GpuError, Result};
use crate::provider::Provider;

/// Variable controlling CUDA device visibility.
pub const CUDA_VISIBLE_DEVICES: &str = "CUDA_VISIBLE_DEVICES";

/// Variable controlling HIP device visibility.
pub const HIP_VISIBLE_DEVICES: &str = "HIP_VISIBLE_DEVICES";

/// Sorted lists of visible system indices per provider.
///
/// `None` means the variable is unset and every device is visible.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibleDevices {
    cuda: Option<Vec<i64>>,
    hip: Option<Vec<i64>>,
}

fn normalize(mut indices: Vec<i64>) -> Vec<i64> {
    indices.sort_unstable();
    indices.dedup();
    indices
}

fn parse_list(variable: &str, value: &str) -> Result<Vec<i64>> {
    if value.trim().is_empty() {
        return Ok(Vec::new());
    }
    let indices = value
        .split(',')
        .map(|item| {
            item.trim().parse::<i64>().map_err(|_| {
                GpuError::invalid_config(format!(
                    "{variable} environment variable contains values that are not integer, \
                     which is not supported: {item:?}"
                ))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(normalize(indices))
}

impl VisibleDevices {
    /// Everything visible.
    pub const fn all() -> Self {
        Self {
            cuda: None,
            hip: None,
        }
    }

    /// Build from explicit lists.
    ///
    /// When `hip` is `None` the HIP list is inherited from `cuda`, matching
    /// the HIP runtime, which honours `CUDA_VISIBLE_DEVICES` when its own
    /// variable is unset.
    pub fn new(cuda: Option<Vec<i64>>, hip: Option<Vec<i64>>) -> Self {
        let cuda = cuda.map(normalize);
        let hip = hip.map(normalize).or_else(|| cuda.clone());
        Self { cuda, hip }
    }

    /// Parse raw variable values.
    pub fn parse(cuda: Option<&str>, hip: Option<&str>) -> Result<Self> {
        let cuda = cuda.map(|v| parse_list(CUDA_VISIBLE_DEVICES, v)).transpose()?;
        let hip = hip.map(|v| parse_list(HIP_VISIBLE_DEVICES, v)).transpose()?;
        Ok(Self::new(cuda, hip))
    }

    /// Read both variables from the process environment.
    pub fn from_env() -> Result<Self> {
        let read = |name: &str| std::env::var_os(name).map(|v| v.to_string_lossy().into_owned());
        let cuda = read(CUDA_VISIBLE_DEVICES);
        let hip = read(HIP_VISIBLE_DEVICES);
        Self::parse(cuda.as_deref(), hip.as_deref())
    }

    /// Visible list for one provider, `None` when unrestricted.
    pub fn for_provider(&self, provider: Provider) -> Option<&[i64]> {
        if provider == Provider::CUDA {
            self.cuda.as_deref()
        } else if provider == Provider::HIP {
            self.hip.as_deref()
        } else {
            None
        }
    }

    /// Process-visible index of a device, `None` when it is hidden.
    pub fn local_index(&self, provider: Provider, system_index: usize) -> Option<usize> {
        match self.for_provider(provider) {
            None => Some(system_index),
            Some(list) => {
                let system_index = i64::try_from(system_index).ok()?;
                list.iter().position(|&i| i == system_index)
            }
        }
    }
}

/// Removes the visibility variables for its lifetime.
///
/// The previous values are restored on drop. Environment changes are
/// process-wide, so enumerations on other threads observe them too.
#[derive(Debug)]
pub struct SystemViewGuard {
    saved: Vec<(&'static str, OsString)>,
}

impl SystemViewGuard {
    /// Save and unset both variables.
    pub fn enter() -> Self {
        let mut saved = Vec::new();
        for name in [CUDA_VISIBLE_DEVICES, HIP_VISIBLE_DEVICES] {
            if let Some(value) = std::env::var_os(name) {
                std::env::remove_var(name);
                saved.push((name, value));
            }
        }
        Self { saved }
    }
}

impl Drop for SystemViewGuard {
    fn drop(&mut self) {
        for (name, value) in self.saved.drain(..) {
            std::env::set_var(name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;

    #[test]
    fn test_parse_sorts_and_dedups() {
        let visible = VisibleDevices::parse(Some("3,1, 1,2"), None).unwrap();
        assert_eq!(visible.for_provider(Provider::CUDA), Some(&[1, 2, 3][..]));
        // Inherited.
        assert_eq!(visible.for_provider(Provider::HIP), Some(&[1, 2, 3][..]));
    }

    #[test]
    fn test_parse_hip_overrides() {
        let visible = VisibleDevices::parse(Some("0"), Some("1,0")).unwrap();
        assert_eq!(visible.for_provider(Provider::CUDA), Some(&[0][..]));
        assert_eq!(visible.for_provider(Provider::HIP), Some(&[0, 1][..]));
    }

    #[test]
    fn test_parse_rejects_non_integers() {
        let err = VisibleDevices::parse(Some("0,GPU-abc"), None).unwrap_err();
        let text = err.to_string();
        assert!(text.contains(CUDA_VISIBLE_DEVICES));
        assert!(text.contains("GPU-abc"));

        assert!(VisibleDevices::parse(None, Some("x")).is_err());
    }

    #[test]
    fn test_empty_hides_everything() {
        let visible = VisibleDevices::parse(Some(""), None).unwrap();
        assert_eq!(visible.local_index(Provider::CUDA, 0), None);
        assert_eq!(visible.local_index(Provider::HIP, 0), None);
    }

    #[test]
    fn test_local_index() {
        let visible = VisibleDevices::new(Some(vec![5, 2]), Some(vec![]));
        assert_eq!(visible.local_index(Provider::CUDA, 2), Some(0));
        assert_eq!(visible.local_index(Provider::CUDA, 5), Some(1));
        assert_eq!(visible.local_index(Provider::CUDA, 3), None);
        assert_eq!(visible.local_index(Provider::HIP, 0), None);

        let all = VisibleDevices::all();
        assert_eq!(all.local_index(Provider::HIP, 7), Some(7));
    }

    #[test]
    #[serial(visible_devices)]
    fn test_guard_restores_variables() {
        std::env::set_var(CUDA_VISIBLE_DEVICES, "1");
        std::env::remove_var(HIP_VISIBLE_DEVICES);

        let visible = VisibleDevices::from_env().unwrap();
        {
            let _guard = SystemViewGuard::enter();
            assert!(std::env::var_os(CUDA_VISIBLE_DEVICES).is_none());
            assert!(std::env::var_os(HIP_VISIBLE_DEVICES).is_none());
        }
        assert_eq!(std::env::var(CUDA_VISIBLE_DEVICES).unwrap(), "1");
        assert!(std::env::var_os(HIP_VISIBLE_DEVICES).is_none());
        assert_eq!(visible.local_index(Provider::HIP, 1), Some(0));

        std::env::remove_var(CUDA_VISIBLE_DEVICES);
    }
}
