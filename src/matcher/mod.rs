//! Matcher compilation: matcher string → native predicate.
//!
//! Compilation resolves every `r.<field>`/`p.<field>` reference to a fixed
//! index, binds `g`-style calls to role-manager handles and links the
//! built-in operators, so request-time evaluation is a walk over a small
//! resolved tree with zero lookups by name.

mod ast;
mod compile;

use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::EngineError;
use crate::model::Model;
use crate::rbac::RoleManager;
use compile::{eval, Node, Value};

/// Compiled matcher predicate `(request_values, policy_values) → bool`.
/// Immutable after compile; safe to share across threads.
#[derive(Debug, Clone)]
pub struct CompiledMatcher {
    root: Node,
}

impl CompiledMatcher {
    pub fn eval(
        &self,
        request_values: &[&str],
        policy_values: &[&str],
    ) -> Result<bool, EngineError> {
        match eval(&self.root, request_values, policy_values)? {
            Value::Bool(b) => Ok(b),
            other => Err(EngineError::Eval(format!(
                "matcher must evaluate to a boolean, got {other:?}"
            ))),
        }
    }
}

/// Compile the model's `m` matcher against its `r`/`p` definitions and
/// the provided role-manager handles.
pub fn compile(
    model: &Model,
    role_managers: &HashMap<String, Arc<RoleManager>>,
) -> Result<CompiledMatcher, EngineError> {
    let request_fields = model
        .request_fields("r")
        .ok_or_else(|| EngineError::InvalidModel("missing `r` in [request_definition]".into()))?;
    let policy_fields = model
        .policy_fields("p")
        .ok_or_else(|| EngineError::InvalidModel("missing `p` in [policy_definition]".into()))?;
    let expr_text = Model::require(&model.matchers, "matchers", "m")?;

    let expr = ast::parse_matcher(expr_text)?;
    let root = compile::resolve(&expr, &request_fields, &policy_fields, role_managers)?;
    Ok(CompiledMatcher { root })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rbac_model() -> Model {
        Model::from_str(
            r#"
[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act

[role_definition]
g = _, _

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = g(r.sub, p.sub) && keyMatch(r.obj, p.obj) && r.act == p.act
"#,
        )
    }

    fn handles_with_alice_admin() -> HashMap<String, Arc<RoleManager>> {
        let rm = Arc::new(RoleManager::new());
        rm.add_link("alice", "admin", None);
        HashMap::from([("g".to_string(), rm)])
    }

    #[test]
    fn test_compile_and_eval_rbac() {
        let matcher = compile(&rbac_model(), &handles_with_alice_admin()).unwrap();

        assert!(matcher
            .eval(&["alice", "/data/x", "read"], &["admin", "/data/*", "read"])
            .unwrap());
        assert!(!matcher
            .eval(&["bob", "/data/x", "read"], &["admin", "/data/*", "read"])
            .unwrap());
        assert!(!matcher
            .eval(&["alice", "/data/x", "write"], &["admin", "/data/*", "read"])
            .unwrap());
        assert!(!matcher
            .eval(&["alice", "/other/x", "read"], &["admin", "/data/*", "read"])
            .unwrap());
    }

    #[test]
    fn test_subject_matches_role_directly() {
        let matcher = compile(&rbac_model(), &handles_with_alice_admin()).unwrap();
        // has_link is reflexive, so the role itself passes the g() check
        assert!(matcher
            .eval(&["admin", "/data/x", "read"], &["admin", "/data/*", "read"])
            .unwrap());
    }

    #[test]
    fn test_unknown_request_field() {
        let model = Model::from_str(
            "[request_definition]\nr = sub, obj, act\n[policy_definition]\np = sub, obj, act\n[matchers]\nm = r.dom == p.sub\n",
        );
        let err = compile(&model, &HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("r.dom"));
    }

    #[test]
    fn test_unknown_policy_field() {
        let model = Model::from_str(
            "[request_definition]\nr = sub\n[policy_definition]\np = sub\n[matchers]\nm = r.sub == p.eft\n",
        );
        let err = compile(&model, &HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("p.eft"));
    }

    #[test]
    fn test_missing_role_manager_handle() {
        let model = rbac_model();
        let err = compile(&model, &HashMap::new()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Matcher compile error: RoleManager for 'g' not found"
        );
    }

    #[test]
    fn test_unknown_function() {
        let model = Model::from_str(
            "[request_definition]\nr = sub\n[policy_definition]\np = sub\n[matchers]\nm = frob(r.sub, p.sub)\n",
        );
        let err = compile(&model, &HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("unknown function `frob`"));
    }

    #[test]
    fn test_domain_aware_role_check() {
        let model = Model::from_str(
            r#"
[request_definition]
r = sub, dom, obj, act

[policy_definition]
p = sub, dom, obj, act

[role_definition]
g = _, _, _

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = g(r.sub, p.sub, r.dom) && r.dom == p.dom && keyMatch2(r.obj, p.obj) && r.act == p.act
"#,
        );
        let rm = Arc::new(RoleManager::new());
        rm.add_link("alice", "admin", Some("tenant-a"));
        let handles = HashMap::from([("g".to_string(), rm)]);
        let matcher = compile(&model, &handles).unwrap();

        assert!(matcher
            .eval(
                &["alice", "tenant-a", "/streams/42", "write"],
                &["admin", "tenant-a", "/streams/:id", "write"],
            )
            .unwrap());
        assert!(!matcher
            .eval(
                &["alice", "tenant-b", "/streams/42", "write"],
                &["admin", "tenant-b", "/streams/:id", "write"],
            )
            .unwrap());
    }

    #[test]
    fn test_two_role_managers() {
        let model = Model::from_str(
            r#"
[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act

[role_definition]
g = _, _
g2 = _, _

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = g(r.sub, p.sub) && g2(r.obj, p.obj) && r.act == p.act
"#,
        );
        let g = Arc::new(RoleManager::new());
        g.add_link("alice", "admin", None);
        let g2 = Arc::new(RoleManager::new());
        g2.add_link("/data/x", "data_group", None);
        let handles = HashMap::from([("g".to_string(), g), ("g2".to_string(), g2)]);
        let matcher = compile(&model, &handles).unwrap();

        assert!(matcher
            .eval(&["alice", "/data/x", "read"], &["admin", "data_group", "read"])
            .unwrap());
        assert!(!matcher
            .eval(&["alice", "/other", "read"], &["admin", "data_group", "read"])
            .unwrap());
    }

    #[test]
    fn test_out_of_range_request_is_an_error() {
        let matcher = compile(&rbac_model(), &handles_with_alice_admin()).unwrap();
        let err = matcher.eval(&["alice"], &["admin", "/data/*", "read"]).unwrap_err();
        assert!(matches!(err, EngineError::Eval(_)));
    }

    #[test]
    fn test_same_inputs_same_output() {
        let matcher = compile(&rbac_model(), &handles_with_alice_admin()).unwrap();
        let r = ["alice", "/data/x", "read"];
        let p = ["admin", "/data/*", "read"];
        let first = matcher.eval(&r, &p).unwrap();
        for _ in 0..10 {
            assert_eq!(matcher.eval(&r, &p).unwrap(), first);
        }
    }

    #[test]
    fn test_string_literal_in_matcher() {
        let model = Model::from_str(
            "[request_definition]\nr = sub, obj, act\n[policy_definition]\np = sub, obj, act\n[matchers]\nm = r.sub == \"root\" || r.sub == p.sub\n",
        );
        let matcher = compile(&model, &HashMap::new()).unwrap();
        assert!(matcher.eval(&["root", "x", "y"], &["p", "q", "r"]).unwrap());
        assert!(matcher.eval(&["bob", "x", "y"], &["bob", "q", "r"]).unwrap());
        assert!(!matcher.eval(&["bob", "x", "y"], &["p", "q", "r"]).unwrap());
    }
}
