//! Serialization of device records.
#![cfg(feature = "serde")]

use gpuq_core::prelude::*;

#[test]
fn test_record_serializes_flat() {
    let device = MockImplementation::new()
        .get(0, Provider::any(), true)
        .unwrap();
    let value = serde_json::to_value(device).unwrap();

    assert_eq!(value["name"], "CUDA Mock Device");
    assert_eq!(value["provider_name"], "CUDA");
    assert_eq!(value["total_memory"], 8_u64 << 30);
    assert_eq!(value["local_index"], 0);
    assert_eq!(value["cooperative"], true);
}

#[test]
fn test_record_round_trips() {
    let props = gpuq_core::mock::mock_template().with_provider(Provider::HIP);
    let text = serde_json::to_string(&props).unwrap();
    let back: DeviceProps = serde_json::from_str(&text).unwrap();
    assert_eq!(back, props);
}
