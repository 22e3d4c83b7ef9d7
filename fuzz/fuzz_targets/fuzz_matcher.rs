// Copyright 2026 BadCompany
// Licensed under the Apache License, Version 2.0

#![no_main]

use arbitrary::{Arbitrary, Unstructured};
use libfuzzer_sys::fuzz_target;
use serde_json::json;
use tool_warden::engine::evaluator::PolicyEvaluator;
use tool_warden::utils::policy_validator::validate;

/// One rule built from fuzzer-chosen pattern and predicate arguments.
#[derive(Debug, Arbitrary)]
struct FuzzMatchInput {
    pattern: String,
    flags: String,
    count_threshold: Option<u8>,
    predicate: String,
    predicate_arg: String,
    tool_name: String,
    param_key: String,
    param_value: String,
}

fuzz_target!(|data: &[u8]| {
    let mut unstructured = Unstructured::new(data);
    let Ok(input) = FuzzMatchInput::arbitrary(&mut unstructured) else {
        return;
    };

    let mut pattern = json!({"kind": "pattern", "pattern": input.pattern, "flags": input.flags});
    if let Some(n) = input.count_threshold {
        pattern["countThreshold"] = json!(n);
    }
    let doc = json!({
        "version": "1",
        "rules": [{
            "id": "fuzz",
            "priority": 1,
            "conditions": [
                pattern,
                {"kind": "predicate", "name": input.predicate, "args": [input.predicate_arg, "."]}
            ],
            "actions": {"block": true}
        }]
    });

    // Invalid patterns are rejected at load time; valid ones must evaluate without panicking
    if let Ok(policy) = validate(&doc) {
        let params = json!({ input.param_key: input.param_value });
        let _ = PolicyEvaluator::evaluate(&policy, &input.tool_name, &params);
    }
});
