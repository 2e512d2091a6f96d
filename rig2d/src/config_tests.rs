use crate::{AnimationStateConfig, Error};

#[test]
fn default_config_has_no_mixes() {
    let config = AnimationStateConfig::default();
    assert_eq!(config.default_mix, 0.0);
    assert!(config.mixes.is_empty());
    assert!(config.validate().is_ok());
}

#[test]
fn validate_rejects_negative_and_non_finite_values() {
    let negative = AnimationStateConfig {
        mix_attachment_threshold: -0.5,
        ..AnimationStateConfig::default()
    };
    let err = negative.validate().unwrap_err();
    assert!(matches!(err, Error::InvalidValue { ref message } if message.contains("mix_attachment_threshold")));

    let infinite = AnimationStateConfig {
        default_mix: f32::INFINITY,
        ..AnimationStateConfig::default()
    };
    assert!(matches!(infinite.validate(), Err(Error::InvalidValue { .. })));
}

#[cfg(feature = "serde")]
#[test]
fn config_serializes_with_field_names() {
    let config = AnimationStateConfig {
        default_mix: 0.25,
        ..AnimationStateConfig::default()
    };
    let value = serde_json::to_value(&config).unwrap();
    assert_eq!(value["default_mix"], serde_json::json!(0.25));
    assert_eq!(value["mixes"], serde_json::json!([]));
}

#[cfg(feature = "json")]
#[test]
fn json_config_fills_omitted_fields_with_defaults() {
    let config = AnimationStateConfig::from_json_str(
        r#"{
            "default_mix": 0.2,
            "mixes": [{ "from": "walk", "to": "run", "duration": 0.4 }]
        }"#,
    )
    .unwrap();

    assert_eq!(config.default_mix, 0.2);
    assert_eq!(config.event_threshold, 0.0);
    assert_eq!(config.mixes.len(), 1);
    assert_eq!(config.mixes[0].from, "walk");
    assert_eq!(config.mixes[0].duration, 0.4);
}

#[cfg(feature = "json")]
#[test]
fn malformed_json_is_a_config_error() {
    let err = AnimationStateConfig::from_json_str(r#"{ "default_mix": "fast" }"#).unwrap_err();
    assert!(matches!(err, Error::Config { .. }));

    let err = AnimationStateConfig::from_json_str(r#"{ "mixes": [{ "from": "walk" }] }"#)
        .unwrap_err();
    assert!(matches!(err, Error::Config { .. }));
}
