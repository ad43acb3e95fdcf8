//! Filtered, visibility-aware device queries.
//!
//! Every [`Implementation`] gets the [`Query`] methods. A query enumerates
//! the whole machine, attaches each device's process-visible index and then
//! filters by provider and visibility.

use std::fmt;
use std::ops::Deref;

use crate::error::{GpuError, Result};
use crate::implementation::Implementation;
use crate::provider::Provider;
use crate::record::DeviceProps;

/// A device as seen from this process.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Properties {
    #[cfg_attr(feature = "serde", serde(flatten))]
    props: DeviceProps,
    local_index: Option<usize>,
}

impl Properties {
    /// Attach a local index to a record.
    pub fn new(props: DeviceProps, local_index: Option<usize>) -> Self {
        Self { props, local_index }
    }

    /// The raw record.
    pub fn props(&self) -> &DeviceProps {
        &self.props
    }

    /// Machine-wide ordinal.
    pub fn ord(&self) -> usize {
        self.props.ordinal
    }

    /// Owning runtime.
    pub fn provider(&self) -> Provider {
        self.props.provider
    }

    /// Index as seen by the runtime in this process, `None` if hidden.
    pub fn index(&self) -> Option<usize> {
        self.local_index
    }

    /// Alias of [`index`](Self::index).
    pub fn local_index(&self) -> Option<usize> {
        self.local_index
    }

    /// Index within the runtime when visibility is ignored.
    pub fn system_index(&self) -> usize {
        self.props.index
    }

    /// Whether this process can use the device.
    pub fn is_visible(&self) -> bool {
        self.local_index.is_some()
    }
}

impl Deref for Properties {
    type Target = DeviceProps;

    fn deref(&self) -> &DeviceProps {
        &self.props
    }
}

/// Same hardware, regardless of where it sits in the enumeration.
impl PartialEq for Properties {
    fn eq(&self, other: &Self) -> bool {
        self.props.same_hardware(&other.props)
    }
}

impl fmt::Display for Properties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let local = self
            .local_index
            .map_or_else(|| "None".to_string(), |i| i.to_string());
        write!(
            f,
            "Properties({}[{} -> {}], '{}'){{",
            self.props.provider, self.props.index, local, self.props.name.as_str()
        )?;
        for (key, value) in self.props.fields() {
            if matches!(key, "ord" | "provider" | "index" | "name") {
                continue;
            }
            write!(f, "\n    {key}: {value}")?;
        }
        f.write_str("\n}")
    }
}

/// Providers that must have at least one device for a query to succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Required {
    /// Nothing is required.
    #[default]
    No,
    /// Every provider of the query's filter (all of them for `any()`).
    Requested,
    /// The given providers.
    Providers(Provider),
}

impl Required {
    fn resolve(self, filter: Provider) -> Provider {
        match self {
            Self::No => Provider::empty(),
            Self::Requested => filter.or_all(),
            Self::Providers(providers) => providers,
        }
    }
}

impl From<Provider> for Required {
    fn from(providers: Provider) -> Self {
        Self::Providers(providers)
    }
}

impl From<bool> for Required {
    fn from(required: bool) -> Self {
        if required {
            Self::Requested
        } else {
            Self::No
        }
    }
}

fn enumerate<I: Implementation + ?Sized>(imp: &I, visible_only: bool) -> Result<Vec<Properties>> {
    let visible = imp.visible()?;
    let count = imp.system_count()?;
    let mut devices = Vec::with_capacity(count);
    for ordinal in 0..count {
        let props = imp.system_get(ordinal)?;
        let local_index = visible.local_index(props.provider, props.index);
        if visible_only && local_index.is_none() {
            continue;
        }
        devices.push(Properties::new(props, local_index));
    }
    Ok(devices)
}

/// Device queries available on every [`Implementation`].
pub trait Query: Implementation {
    /// Whether the runtimes of all `providers` are present.
    ///
    /// With `any()`, whether at least one runtime is present.
    fn has_provider(&self, providers: Provider) -> bool {
        if providers.is_empty() {
            Provider::all().iter().any(|p| self.provider_check(p))
        } else {
            providers.iter().all(|p| self.provider_check(p))
        }
    }

    /// Whether the CUDA driver is present.
    fn has_cuda(&self) -> bool {
        self.has_provider(Provider::CUDA)
    }

    /// Whether the HIP runtime is present.
    fn has_amd(&self) -> bool {
        self.has_provider(Provider::HIP)
    }

    /// Number of devices matching the filter.
    fn count(&self, provider: Provider, visible_only: bool) -> Result<usize> {
        Ok(enumerate(self, visible_only)?
            .iter()
            .filter(|d| provider.admits(d.provider()))
            .count())
    }

    /// The `index`-th device matching the filter.
    fn get(&self, index: usize, provider: Provider, visible_only: bool) -> Result<Properties> {
        let matching: Vec<_> = enumerate(self, visible_only)?
            .into_iter()
            .filter(|d| provider.admits(d.provider()))
            .collect();
        let count = matching.len();
        matching
            .into_iter()
            .nth(index)
            .ok_or_else(|| GpuError::invalid_index(i64::try_from(index).unwrap_or(i64::MAX), count))
    }

    /// All devices matching the filter.
    ///
    /// Fails with [`GpuError::ProviderRequired`] when a required provider has
    /// no device, independently of the provider filter.
    fn query(
        &self,
        provider: Provider,
        visible_only: bool,
        required: Required,
    ) -> Result<Vec<Properties>> {
        let devices = enumerate(self, visible_only)?;

        for needed in required.resolve(provider).iter() {
            if !devices.iter().any(|d| d.provider() == needed) {
                return Err(GpuError::ProviderRequired { provider: needed });
            }
        }

        Ok(devices
            .into_iter()
            .filter(|d| provider.admits(d.provider()))
            .collect())
    }
}

impl<T: Implementation + ?Sized> Query for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockImplementation;

    #[test]
    fn test_display() {
        let mock = MockImplementation::new().cuda(Some(2)).cuda_visible([1]);
        let device = mock.get(1, Provider::any(), false).unwrap();
        let text = device.to_string();
        assert!(text.starts_with("Properties(CUDA[1 -> 0], 'CUDA Mock Device'){\n    major: 1\n"));
        assert!(!text.contains("ord:"));
        assert!(text.ends_with("\n    cooperative: true\n}"));

        let hidden = mock.get(0, Provider::any(), false).unwrap();
        assert!(hidden.to_string().starts_with("Properties(CUDA[0 -> None]"));
    }

    #[test]
    fn test_required_resolution() {
        assert_eq!(Required::No.resolve(Provider::CUDA), Provider::empty());
        assert_eq!(Required::Requested.resolve(Provider::any()), Provider::all());
        assert_eq!(Required::Requested.resolve(Provider::HIP), Provider::HIP);
        assert_eq!(Required::from(Provider::CUDA).resolve(Provider::HIP), Provider::CUDA);
        assert_eq!(Required::from(true), Required::Requested);
    }

    #[test]
    fn test_equality_ignores_position() {
        let mock = MockImplementation::new().cuda(Some(2));
        let a = mock.get(0, Provider::any(), false).unwrap();
        let b = mock.get(1, Provider::any(), false).unwrap();
        assert_eq!(a, b);

        let other = MockImplementation::new().cuda(None).hip(Some(1));
        let c = other.get(0, Provider::any(), false).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_has_provider() {
        let mock = MockImplementation::new().cuda(Some(0)).hip(None);
        assert!(mock.has_cuda());
        assert!(!mock.has_amd());
        assert!(mock.has_provider(Provider::any()));
        assert!(!mock.has_provider(Provider::all()));
    }
}
