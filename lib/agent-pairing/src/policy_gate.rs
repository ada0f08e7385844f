use insights_agent_redact::{redact_method_tree, redact_path_template, zero_method_tree, RedactionPolicy};
use insights_agent_witness::{ObfuscationFlag, Witness};

/// "repro-eligible" (spec.md §4.4 "Policy gate on emit"): the method has
/// at least one response and every response status is in `[400, 600)`,
/// and the path is not on the cloud-API exclusion list.
pub fn is_repro_eligible(witness: &Witness, policy: &RedactionPolicy) -> bool {
    let status_in_error_range = matches!(witness.status_code, Some(code) if (400..600).contains(&code));
    if witness.response.is_none() || !status_in_error_range {
        return false;
    }
    !policy.is_excluded_endpoint(&witness.meta.host, &witness.meta.path_template)
}

/// Applies the policy gate (spec.md §4.4): repro-eligible exchanges in
/// repro mode are redacted (`obfuscation = None`); everything else is
/// zeroed (`obfuscation = ZeroValue`).
pub fn apply_policy_gate(mut witness: Witness, repro_mode: bool, policy: &RedactionPolicy) -> Witness {
    if repro_mode && is_repro_eligible(&witness, policy) {
        redact_method_tree(&mut witness.request, policy);
        if let Some(response) = witness.response.as_mut() {
            redact_method_tree(response, policy);
        }
        witness.meta.path_template = redact_path_template(&witness.meta.path_template, policy);
        witness.meta.obfuscation = ObfuscationFlag::None;
    } else {
        zero_method_tree(&mut witness.request);
        if let Some(response) = witness.response.as_mut() {
            zero_method_tree(response);
        }
        witness.meta.obfuscation = ObfuscationFlag::ZeroValue;
    }
    witness
}

#[cfg(test)]
mod tests {
    use super::*;
    use insights_agent_value::Value;
    use insights_agent_witness::{FiveTuple, MethodMeta, MethodTree};
    use std::collections::BTreeMap;
    use std::net::{IpAddr, Ipv4Addr};

    fn policy() -> RedactionPolicy {
        RedactionPolicy::load_embedded().unwrap()
    }

    fn witness(status: Option<u16>, host: &str, path: &str) -> Witness {
        Witness {
            pair_key: insights_agent_witness::PairKey::new("s", 1),
            tuple: FiveTuple {
                src_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
                src_port: 1,
                dst_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
                dst_port: 2,
                interface: "eth0".to_string(),
            },
            request: MethodTree::empty(),
            response: Some(MethodTree::empty()),
            meta: MethodMeta {
                method: "GET".to_string(),
                host: host.to_string(),
                path_template: path.to_string(),
                processing_latency_ms: None,
                obfuscation: ObfuscationFlag::None,
            },
            status_code: status,
            request_end: None,
            response_start: None,
        }
    }

    #[test]
    fn error_status_is_repro_eligible() {
        let w = witness(Some(404), "example.com", "/v1/doggos");
        assert!(is_repro_eligible(&w, &policy()));
    }

    #[test]
    fn success_status_is_not_repro_eligible() {
        let w = witness(Some(200), "example.com", "/v1/doggos");
        assert!(!is_repro_eligible(&w, &policy()));
    }

    #[test]
    fn non_repro_eligible_exchange_is_zeroed() {
        let mut w = witness(Some(200), "example.com", "/v1/doggos");
        w.request.body = Some(Value::Object(BTreeMap::from([(
            "name".to_string(),
            Value::from("prince"),
        )])));
        let gated = apply_policy_gate(w, true, &policy());
        assert_eq!(gated.meta.obfuscation, ObfuscationFlag::ZeroValue);
        match gated.request.body.unwrap() {
            Value::Object(map) => assert_eq!(map["name"], Value::String(String::new())),
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn repro_eligible_exchange_in_repro_mode_is_redacted_not_zeroed() {
        let mut w = witness(Some(404), "example.com", "/v1/doggos");
        w.request.headers = Value::Object(BTreeMap::from([(
            "x-access-token".to_string(),
            Value::from("SECRET"),
        )]));
        let gated = apply_policy_gate(w, true, &policy());
        assert_eq!(gated.meta.obfuscation, ObfuscationFlag::None);
        match gated.request.headers {
            Value::Object(map) => assert_eq!(map["x-access-token"], Value::from("*REDACTED*")),
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn outside_repro_mode_everything_is_zeroed_even_if_eligible() {
        let w = witness(Some(404), "example.com", "/v1/doggos");
        let gated = apply_policy_gate(w, false, &policy());
        assert_eq!(gated.meta.obfuscation, ObfuscationFlag::ZeroValue);
    }
}
