// Copyright 2026 BadCompany
// Licensed under the Apache License, Version 2.0

#![no_main]

use libfuzzer_sys::fuzz_target;
use serde_json::Value;
use tool_warden::loader::merge;
use tool_warden::utils::policy_validator::validate;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Policy files arrive as either JSON or YAML
    let docs = [
        serde_json::from_str::<Value>(text).ok(),
        serde_yaml_ng::from_str::<Value>(text).ok(),
    ];

    for doc in docs.into_iter().flatten() {
        if let Ok(policy) = validate(&doc) {
            let merged = merge(&[policy.clone(), policy]).expect("two inputs always merge");
            assert!(merged
                .rules
                .windows(2)
                .all(|w| w[0].priority >= w[1].priority));
        }
    }
});
