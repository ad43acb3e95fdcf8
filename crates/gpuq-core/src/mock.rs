//! Hardware-free stand-ins for drivers and whole systems.
//!
//! [`MockDriver`] plugs into a [`Backend`](crate::backend::Backend) and is
//! steered through a shared [`MockDriverHandle`]: the library can be made
//! absent, symbols can go missing, vendor calls can fail. [`MockImplementation`]
//! replaces the entire machine for the query layer.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{CallError, Driver, NativeDescriptor, NativeStatus};
use crate::diagnostics::Diagnostics;
use crate::error::{GpuError, LoadError, Result};
use crate::implementation::Implementation;
use crate::provider::Provider;
use crate::record::{DeviceName, DeviceProps};
use crate::visibility::VisibleDevices;

/// Name template of mock devices; `{}` is replaced by the provider name.
pub const MOCK_NAME: &str = "{} Mock Device";

/// Record every mock device is derived from.
pub fn mock_template() -> DeviceProps {
    DeviceProps {
        name: DeviceName::new(MOCK_NAME),
        major: 1,
        minor: 2,
        total_memory: 8 << 30,
        sms_count: 12,
        sm_threads: 2048,
        sm_shared_memory: 16 << 10,
        sm_registers: 512,
        sm_blocks: 4,
        block_threads: 1024,
        block_shared_memory: 8 << 10,
        block_registers: 256,
        warp_size: 32,
        l2_cache_size: 8 << 20,
        concurrent_kernels: true,
        async_engines_count: 0,
        cooperative: true,
        ..DeviceProps::empty(Provider::CUDA)
    }
}

fn mock_device(
    template: &DeviceProps,
    provider: Provider,
    ordinal: usize,
    index: usize,
) -> DeviceProps {
    let mut props = template.with_provider(provider);
    let vendor = provider.name().unwrap_or_default();
    props.name = DeviceName::new(&template.name.as_str().replace("{}", vendor));
    props.ordinal = ordinal;
    props.index = index;
    props
}

/// Behaviour of a [`MockDriver`].
#[derive(Debug, Clone)]
pub struct MockDriverState {
    provider: Provider,
    present: bool,
    missing_symbols: Vec<String>,
    devices: usize,
    template: DeviceProps,
    count_failure: Option<NativeStatus>,
    describe_failure: Option<NativeStatus>,
    load_attempts: usize,
    describe_calls: usize,
    open_drivers: usize,
}

impl MockDriverState {
    /// A present driver with no device.
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            present: true,
            missing_symbols: Vec::new(),
            devices: 0,
            template: mock_template(),
            count_failure: None,
            describe_failure: None,
            load_attempts: 0,
            describe_calls: 0,
            open_drivers: 0,
        }
    }

    /// Make the library fail to open.
    pub fn absent(mut self) -> Self {
        self.present = false;
        self
    }

    /// Number of devices reported.
    pub fn devices(mut self, count: usize) -> Self {
        self.devices = count;
        self
    }

    /// Symbols reported as missing when the library is opened.
    pub fn missing_symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.missing_symbols = symbols.into_iter().map(Into::into).collect();
        self
    }

    /// Record the devices are derived from.
    pub fn template(mut self, template: DeviceProps) -> Self {
        self.template = template;
        self
    }

    /// Make the count call fail with `code`.
    pub fn count_failure(mut self, code: NativeStatus) -> Self {
        self.count_failure = Some(code);
        self
    }

    /// Share the state so it can be observed and changed later.
    pub fn into_handle(self) -> MockDriverHandle {
        MockDriverHandle(Arc::new(Mutex::new(self)))
    }
}

/// Shared handle to a [`MockDriverState`]; the locator of [`MockDriver`].
#[derive(Debug, Clone)]
pub struct MockDriverHandle(Arc<Mutex<MockDriverState>>);

impl MockDriverHandle {
    /// Number of times a driver was opened (successfully or not).
    pub fn load_attempts(&self) -> usize {
        self.0.lock().load_attempts
    }

    /// Number of device descriptions read.
    pub fn describe_calls(&self) -> usize {
        self.0.lock().describe_calls
    }

    /// Number of drivers currently alive.
    pub fn open_drivers(&self) -> usize {
        self.0.lock().open_drivers
    }

    /// Make the library available or not for later attempts.
    pub fn set_present(&self, present: bool) {
        self.0.lock().present = present;
    }

    /// Change the number of devices.
    pub fn set_devices(&self, count: usize) {
        self.0.lock().devices = count;
    }

    /// Make the count call fail, or succeed again with `None`.
    pub fn fail_count(&self, code: Option<NativeStatus>) {
        self.0.lock().count_failure = code;
    }

    /// Make device descriptions fail, or succeed again with `None`.
    pub fn fail_describe(&self, code: Option<NativeStatus>) {
        self.0.lock().describe_failure = code;
    }
}

/// Native description produced by [`MockDriver`].
#[derive(Debug, Clone, Copy)]
pub struct MockDescriptor(DeviceProps);

impl NativeDescriptor for MockDescriptor {
    fn normalize(&self, ordinal: usize, index: usize) -> DeviceProps {
        DeviceProps {
            ordinal,
            index,
            ..self.0
        }
    }
}

/// Driver whose behaviour is scripted by a [`MockDriverHandle`].
#[derive(Debug)]
pub struct MockDriver {
    handle: MockDriverHandle,
}

impl Driver for MockDriver {
    type Locator = MockDriverHandle;
    type Descriptor = MockDescriptor;

    const NO_DEVICE: NativeStatus = 100;

    fn provider(locator: &MockDriverHandle) -> Provider {
        locator.0.lock().provider
    }

    fn open(
        locator: &MockDriverHandle,
        diagnostics: &mut Diagnostics,
    ) -> std::result::Result<Self, LoadError> {
        let mut state = locator.0.lock();
        state.load_attempts += 1;

        if !state.present {
            let library = format!("libmock{}.so", state.provider.to_string().to_lowercase());
            diagnostics.append(&format!(
                "{library}: cannot open shared object file: No such file or directory"
            ));
            return Err(LoadError::LibraryNotFound { tried: 1 });
        }
        if !state.missing_symbols.is_empty() {
            for symbol in &state.missing_symbols {
                diagnostics.append(&format!("undefined symbol: {symbol}"));
            }
            return Err(LoadError::MissingSymbols {
                symbols: state.missing_symbols.clone(),
            });
        }

        state.open_drivers += 1;
        Ok(Self {
            handle: locator.clone(),
        })
    }

    fn device_count(&mut self) -> std::result::Result<usize, CallError> {
        let state = self.handle.0.lock();
        match state.count_failure {
            Some(code) => Err(CallError::new("mockGetDeviceCount", code)),
            None => Ok(state.devices),
        }
    }

    fn describe(&mut self, index: usize) -> std::result::Result<MockDescriptor, CallError> {
        let mut state = self.handle.0.lock();
        state.describe_calls += 1;
        if let Some(code) = state.describe_failure {
            return Err(CallError::new("mockGetDeviceProperties", code));
        }
        Ok(MockDescriptor(mock_device(&state.template, state.provider, index, index)))
    }
}

impl Drop for MockDriver {
    fn drop(&mut self) {
        let mut state = self.handle.0.lock();
        state.open_drivers = state.open_drivers.saturating_sub(1);
    }
}

/// Simulated machine for the query layer.
///
/// `None` device counts mean the runtime is not installed; `Some(0)` means it
/// is installed without devices. Devices are numbered CUDA first, then HIP.
#[derive(Debug, Clone)]
pub struct MockImplementation {
    cuda_count: Option<usize>,
    hip_count: Option<usize>,
    cuda_visible: Option<Vec<i64>>,
    hip_visible: Option<Vec<i64>>,
    template: DeviceProps,
}

impl Default for MockImplementation {
    fn default() -> Self {
        Self {
            cuda_count: Some(1),
            hip_count: None,
            cuda_visible: None,
            hip_visible: None,
            template: mock_template(),
        }
    }
}

impl MockImplementation {
    /// One CUDA device, no HIP runtime.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the CUDA device count (`None`: runtime absent).
    pub fn cuda(mut self, count: Option<usize>) -> Self {
        self.cuda_count = count;
        self
    }

    /// Set the HIP device count (`None`: runtime absent).
    pub fn hip(mut self, count: Option<usize>) -> Self {
        self.hip_count = count;
        self
    }

    /// Simulate `CUDA_VISIBLE_DEVICES`.
    pub fn cuda_visible<I: IntoIterator<Item = i64>>(mut self, indices: I) -> Self {
        self.cuda_visible = Some(indices.into_iter().collect());
        self
    }

    /// Simulate `HIP_VISIBLE_DEVICES`.
    pub fn hip_visible<I: IntoIterator<Item = i64>>(mut self, indices: I) -> Self {
        self.hip_visible = Some(indices.into_iter().collect());
        self
    }

    /// Record the devices are derived from.
    ///
    /// A `{}` in the template name is replaced by the provider name.
    pub fn template(mut self, template: DeviceProps) -> Self {
        self.template = template;
        self
    }

    fn cuda_total(&self) -> usize {
        self.cuda_count.unwrap_or(0)
    }
}

impl Implementation for MockImplementation {
    fn provider_check(&self, provider: Provider) -> bool {
        if provider == Provider::CUDA {
            self.cuda_count.is_some()
        } else if provider == Provider::HIP {
            self.hip_count.is_some()
        } else {
            false
        }
    }

    fn visible(&self) -> Result<VisibleDevices> {
        Ok(VisibleDevices::new(self.cuda_visible.clone(), self.hip_visible.clone()))
    }

    fn system_count(&self) -> Result<usize> {
        Ok(self.cuda_total() + self.hip_count.unwrap_or(0))
    }

    fn system_get(&self, ordinal: usize) -> Result<DeviceProps> {
        let count = self.system_count()?;
        if ordinal >= count {
            return Err(GpuError::invalid_index(
                i64::try_from(ordinal).unwrap_or(i64::MAX),
                count,
            ));
        }

        let cuda = self.cuda_total();
        let device = if ordinal < cuda {
            mock_device(&self.template, Provider::CUDA, ordinal, ordinal)
        } else {
            mock_device(&self.template, Provider::HIP, ordinal, ordinal - cuda)
        };
        Ok(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_mock_names() {
        let mock = MockImplementation::new().cuda(Some(1)).hip(Some(1));
        assert_eq!(mock.system_get(0).unwrap().name.as_str(), "CUDA Mock Device");
        assert_eq!(mock.system_get(1).unwrap().name.as_str(), "HIP Mock Device");
    }

    #[test]
    fn test_mock_numbering() {
        let mock = MockImplementation::new().cuda(Some(2)).hip(Some(3));
        assert_eq!(mock.system_count().unwrap(), 5);

        let props = mock.system_get(3).unwrap();
        assert_eq!(props.provider, Provider::HIP);
        assert_eq!(props.ordinal, 3);
        assert_eq!(props.index, 1);

        assert!(matches!(
            mock.system_get(5),
            Err(GpuError::InvalidIndex { index: 5, count: 5 })
        ));
    }

    #[test]
    fn test_mock_defaults() {
        let props = MockImplementation::new().system_get(0).unwrap();
        assert_eq!(props.total_memory, 8 * 1024 * 1024 * 1024);
        assert_eq!(props.sm_shared_memory, 16 * 1024);
        assert_eq!(props.l2_cache_size, 8 * 1024 * 1024);
        assert_eq!(props.compute_capability(), "1.2");
        assert!(props.cooperative);
    }

    #[test]
    fn test_mock_runtimes() {
        let mock = MockImplementation::new().cuda(Some(0)).hip(Some(0));
        assert!(mock.provider_check(Provider::CUDA));
        assert!(mock.provider_check(Provider::HIP));

        let mock = MockImplementation::new().cuda(None).hip(None);
        assert!(!mock.provider_check(Provider::CUDA));
        assert!(!mock.provider_check(Provider::HIP));
    }

    #[test]
    fn test_driver_handle_tracks_lifetime() {
        let handle = MockDriverState::new(Provider::CUDA).devices(1).into_handle();
        let mut diagnostics = Diagnostics::new();
        let driver = MockDriver::open(&handle, &mut diagnostics).unwrap();
        assert_eq!(handle.open_drivers(), 1);
        drop(driver);
        assert_eq!(handle.open_drivers(), 0);
        assert_eq!(handle.load_attempts(), 1);
    }
}
