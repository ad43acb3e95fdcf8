//! Self-consistency of the real drivers.
//!
//! These tests pass on machines with or without GPUs: they only check that
//! the answers agree with each other.

use gpuq_core::prelude::*;
use gpuq_core::visibility::{CUDA_VISIBLE_DEVICES, HIP_VISIBLE_DEVICES};
use serial_test::serial;

fn isolated() -> GenuineImplementation {
    GenuineImplementation::new(&LoaderConfig::default())
}

#[test]
#[serial(visible_devices)]
fn test_check_is_stable() {
    let gpus = isolated();
    let facade = gpus.facade();

    for provider in [Provider::CUDA, Provider::HIP] {
        facade.clean();
        let first = facade.check(provider);
        let second = facade.check(provider);
        assert_eq!(first, second, "{provider} flipped between checks");

        if !first {
            let text = facade.diagnostics(provider).unwrap_or_default();
            assert!(text.starts_with(" * "), "unexpected diagnostics: {text:?}");
        }
    }
    facade.clean();
    facade.clean();
}

#[test]
#[serial(visible_devices)]
fn test_status_codes_are_valid() {
    let gpus = isolated();
    let facade = gpus.facade();

    for result in [facade.cuda_device_count(), facade.amd_device_count()] {
        if let Err(err) = result {
            assert!(matches!(
                err.status(),
                Status::Unavailable | Status::QueryFailed
            ));
        }
    }

    let err = facade.cuda_device_props(-1).unwrap_err();
    assert!(matches!(
        err.status(),
        Status::Unavailable | Status::QueryFailed | Status::InvalidIndex
    ));
}

#[test]
#[serial(visible_devices)]
fn test_query_agrees_with_count() {
    std::env::remove_var(CUDA_VISIBLE_DEVICES);
    std::env::remove_var(HIP_VISIBLE_DEVICES);

    let gpus = isolated();
    let count = match gpus.count(Provider::any(), false) {
        Ok(count) => count,
        // A broken driver installation is reported, not hidden.
        Err(err) => return assert_eq!(err.status(), Status::QueryFailed),
    };
    let devices = gpus.query(Provider::any(), false, Required::No).unwrap();
    assert_eq!(devices.len(), count);

    for (ord, device) in devices.iter().enumerate() {
        assert_eq!(device.ord(), ord);
        assert!(device.is_visible());
        assert_eq!(device.provider_name.as_str(), device.provider().name().unwrap_or_default());
        assert!(gpus.has_provider(device.provider()));
    }

    let err = gpus.get(count, Provider::any(), false).unwrap_err();
    assert_eq!(err.status(), Status::InvalidIndex);
}

#[test]
#[serial(visible_devices)]
fn test_visibility_from_environment() {
    std::env::set_var(CUDA_VISIBLE_DEVICES, "");
    std::env::remove_var(HIP_VISIBLE_DEVICES);

    let gpus = isolated();
    let result = gpus.count(Provider::any(), true);
    let system = gpus.count(Provider::any(), false);

    // The variables are back in place after the drivers enumerate.
    assert_eq!(std::env::var(CUDA_VISIBLE_DEVICES).as_deref(), Ok(""));
    std::env::remove_var(CUDA_VISIBLE_DEVICES);

    assert_eq!(result.unwrap(), 0);
    assert!(system.is_ok());
}

#[test]
#[serial(visible_devices)]
fn test_invalid_visibility_is_reported() {
    std::env::set_var(HIP_VISIBLE_DEVICES, "0,first");
    let err = isolated().count(Provider::any(), true).unwrap_err();
    std::env::remove_var(HIP_VISIBLE_DEVICES);

    assert_eq!(err.status(), Status::InvalidConfig);
    assert!(err.to_string().contains(HIP_VISIBLE_DEVICES));
}

#[test]
fn test_unreachable_hints() {
    let empty = tempfile::tempdir().unwrap();
    let hints = LocationHints::new([empty.path()]).unwrap();
    let config = LoaderConfigBuilder::new()
        .no_default_hints()
        .hints(hints.dirs().iter().cloned())
        .build()
        .unwrap();

    // Bare library names are still tried, so the outcome depends on the host;
    // the hint itself must never break initialization.
    let gpus = GenuineImplementation::new(&config);
    let before = gpus.provider_check(Provider::CUDA);
    gpus.set_location_hints(&hints);
    gpus.facade().clean();
    assert_eq!(gpus.provider_check(Provider::CUDA), before);
}
