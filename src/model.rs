use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::Path;

use crate::errors::EngineError;

/// Parsed PERM model configuration.
///
/// Each sub-mapping goes from a short key (`"r"`, `"p"`, `"g"`, `"g2"`,
/// `"e"`, `"m"`) to the raw definition string from the model file.
/// Immutable after parse; compilation happens downstream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Model {
    pub request: BTreeMap<String, String>,
    pub policy: BTreeMap<String, String>,
    pub role: BTreeMap<String, String>,
    pub effect: BTreeMap<String, String>,
    pub matchers: BTreeMap<String, String>,
}

/// Section headers recognized by the parser. Anything else is accepted
/// but ignored so host configs can carry their own sections.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    Request,
    Policy,
    Role,
    Effect,
    Matchers,
    Other,
}

impl Section {
    fn from_header(header: &str) -> Self {
        match header {
            "request_definition" => Section::Request,
            "policy_definition" => Section::Policy,
            "role_definition" => Section::Role,
            "policy_effect" => Section::Effect,
            "matchers" => Section::Matchers,
            _ => Section::Other,
        }
    }
}

impl Model {
    /// Parse INI-style model text.
    ///
    /// Empty lines and `#` comments are skipped. Inside a recognized
    /// section, each line is `key = value` split on the first `=`; a line
    /// without `=` is skipped with a warning. Lines in unrecognized
    /// sections (and before any header) are ignored.
    pub fn from_str(text: &str) -> Self {
        let mut model = Model::default();
        let mut current: Option<Section> = None;

        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(header) = line.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
                current = Some(Section::from_header(header.trim()));
                continue;
            }

            let Some(section) = current else {
                tracing::warn!(
                    line = lineno + 1,
                    content = line,
                    "skipping model line outside of any section"
                );
                continue;
            };

            let slot = match section {
                Section::Request => &mut model.request,
                Section::Policy => &mut model.policy,
                Section::Role => &mut model.role,
                Section::Effect => &mut model.effect,
                Section::Matchers => &mut model.matchers,
                Section::Other => continue,
            };

            match line.split_once('=') {
                Some((key, value)) => {
                    slot.insert(key.trim().to_string(), value.trim().to_string());
                }
                None => {
                    tracing::warn!(
                        line = lineno + 1,
                        content = line,
                        "skipping model line without `=`"
                    );
                }
            }
        }

        model
    }

    /// Load and parse a model file. I/O failure is the only hard error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| EngineError::ModelLoad {
            path: path.display().to_string(),
            source,
        })?;
        let model = Self::from_str(&text);
        tracing::info!(
            path = %path.display(),
            request = model.request.len(),
            policy = model.policy.len(),
            role = model.role.len(),
            "Loaded model"
        );
        Ok(model)
    }

    /// Field-name → position map for a request definition key (`"r"`).
    pub fn request_fields(&self, key: &str) -> Option<HashMap<String, usize>> {
        self.request.get(key).map(|def| field_indices(def))
    }

    /// Field-name → position map for a policy definition key (`"p"`).
    pub fn policy_fields(&self, key: &str) -> Option<HashMap<String, usize>> {
        self.policy.get(key).map(|def| field_indices(def))
    }

    /// Look up a definition that the coordinator cannot run without.
    pub fn require<'a>(
        map: &'a BTreeMap<String, String>,
        section: &str,
        key: &str,
    ) -> Result<&'a str, EngineError> {
        map.get(key)
            .map(|s| s.as_str())
            .ok_or_else(|| EngineError::InvalidModel(format!("missing `{key}` in [{section}]")))
    }
}

/// Split a definition like `"sub, obj, act"` into `{field → position}`.
fn field_indices(def: &str) -> HashMap<String, usize> {
    def.split(',')
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .enumerate()
        .map(|(i, f)| (f.to_string(), i))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RBAC_MODEL: &str = r#"
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
m = g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act
"#;

    #[test]
    fn test_parse_rbac_model() {
        let model = Model::from_str(RBAC_MODEL);
        assert_eq!(model.request.get("r").unwrap(), "sub, obj, act");
        assert_eq!(model.policy.get("p").unwrap(), "sub, obj, act");
        assert_eq!(model.role.get("g").unwrap(), "_, _");
        assert_eq!(model.role.get("g2").unwrap(), "_, _");
        assert_eq!(model.effect.get("e").unwrap(), "some(where (p.eft == allow))");
        assert!(model.matchers.get("m").unwrap().starts_with("g(r.sub"));
    }

    #[test]
    fn test_field_indices() {
        let model = Model::from_str(RBAC_MODEL);
        let fields = model.request_fields("r").unwrap();
        assert_eq!(fields["sub"], 0);
        assert_eq!(fields["obj"], 1);
        assert_eq!(fields["act"], 2);
        assert!(!fields.contains_key("dom"));
    }

    #[test]
    fn test_unknown_section_ignored() {
        let model = Model::from_str(
            "[request_definition]\nr = sub\n[custom_stuff]\nfoo = bar\n[matchers]\nm = r.sub == p.sub\n",
        );
        assert_eq!(model.request.get("r").unwrap(), "sub");
        assert!(model.matchers.contains_key("m"));
        // nothing from [custom_stuff] leaks into any map
        let total: usize = [&model.request, &model.policy, &model.role, &model.effect, &model.matchers]
            .iter()
            .map(|m| m.len())
            .sum();
        assert_eq!(total, 2);
    }

    #[test]
    fn test_comments_and_blank_lines() {
        let model = Model::from_str("# heading\n\n[policy_effect]\n# inline note\ne = some(where (p.eft == allow))\n");
        assert!(model.effect.contains_key("e"));
    }

    #[test]
    fn test_line_without_equals_is_skipped() {
        let model = Model::from_str("[request_definition]\nnot a key value line\nr = sub, obj\n");
        assert_eq!(model.request.len(), 1);
        assert_eq!(model.request.get("r").unwrap(), "sub, obj");
    }

    #[test]
    fn test_malformed_header_treated_as_data() {
        // "[matchers" has no closing bracket, so it is a data line of the
        // previous section (and has no `=`, so it is skipped).
        let model = Model::from_str("[policy_effect]\n[matchers\nm = r.sub == p.sub\n");
        assert!(model.matchers.is_empty());
        assert_eq!(model.effect.get("m").unwrap(), "r.sub == p.sub");
    }

    #[test]
    fn test_value_with_equals_splits_once() {
        let model = Model::from_str("[matchers]\nm = r.sub == p.sub && r.act == p.act\n");
        assert_eq!(model.matchers.get("m").unwrap(), "r.sub == p.sub && r.act == p.act");
    }

    #[test]
    fn test_require_missing_key() {
        let model = Model::from_str("[request_definition]\nr = sub\n");
        let err = Model::require(&model.matchers, "matchers", "m").unwrap_err();
        assert!(matches!(err, EngineError::InvalidModel(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.conf");
        std::fs::write(&path, RBAC_MODEL).unwrap();

        let model = Model::from_file(&path).unwrap();
        assert_eq!(model.role.len(), 2);
    }

    #[test]
    fn test_from_file_missing() {
        let err = Model::from_file("/nonexistent/model.conf").unwrap_err();
        assert!(matches!(err, EngineError::ModelLoad { .. }));
    }
}
