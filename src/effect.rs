use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

/// Outcome of evaluating one policy rule against a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    Allow,
    Deny,
    Indeterminate,
}

/// Compiled policy-effect expression: a reducer collapsing a stream of
/// per-rule [`Effect`]s into the final decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effector {
    /// `some(where (p.eft == allow))`
    AllowOverride,
    /// `some(where (p.eft == allow)) && !some(where (p.eft == deny))`
    DenyOverride,
    /// `priority(p.eft) || deny`
    Priority,
}

impl Effector {
    /// Compile an effect expression. The comparison is whitespace-collapsed,
    /// so formatting variants of the three supported forms all parse.
    pub fn from_expr(expr: &str) -> Result<Self, EngineError> {
        let normalized: String = expr.chars().filter(|c| !c.is_whitespace()).collect();
        match normalized.as_str() {
            "some(where(p.eft==allow))" => Ok(Effector::AllowOverride),
            "some(where(p.eft==allow))&&!some(where(p.eft==deny))" => Ok(Effector::DenyOverride),
            "priority(p.eft)||deny" => Ok(Effector::Priority),
            _ => Err(EngineError::UnsupportedEffect(expr.to_string())),
        }
    }

    /// Reduce an effect stream to the final decision. Consumption is lazy:
    /// allow-override stops at the first `Allow`, deny-override at the
    /// first `Deny`, priority at the first non-`Indeterminate` element.
    pub fn reduce(&self, effects: impl IntoIterator<Item = Effect>) -> bool {
        let mut effects = effects.into_iter();
        match self {
            Effector::AllowOverride => effects.any(|e| e == Effect::Allow),
            Effector::DenyOverride => {
                let mut saw_allow = false;
                for effect in effects {
                    match effect {
                        Effect::Deny => return false,
                        Effect::Allow => saw_allow = true,
                        Effect::Indeterminate => {}
                    }
                }
                saw_allow
            }
            Effector::Priority => {
                for effect in effects {
                    match effect {
                        Effect::Allow => return true,
                        Effect::Deny => return false,
                        Effect::Indeterminate => {}
                    }
                }
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_parse_known_forms() {
        assert_eq!(
            Effector::from_expr("some(where (p.eft == allow))").unwrap(),
            Effector::AllowOverride
        );
        assert_eq!(
            Effector::from_expr("some(where (p.eft == allow)) && !some(where (p.eft == deny))")
                .unwrap(),
            Effector::DenyOverride
        );
        assert_eq!(
            Effector::from_expr("priority(p.eft) || deny").unwrap(),
            Effector::Priority
        );
    }

    #[test]
    fn test_parse_unknown_form() {
        let err = Effector::from_expr("max(where (p.eft == allow))").unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedEffect(_)));
    }

    #[test]
    fn test_allow_override() {
        use Effect::*;
        let e = Effector::AllowOverride;
        assert!(e.reduce([Indeterminate, Allow]));
        assert!(e.reduce([Allow, Deny]));
        assert!(!e.reduce([Indeterminate, Deny]));
        assert!(!e.reduce([]));
    }

    #[test]
    fn test_deny_override() {
        use Effect::*;
        let e = Effector::DenyOverride;
        assert!(e.reduce([Allow, Indeterminate]));
        assert!(!e.reduce([Allow, Deny]));
        assert!(!e.reduce([Deny, Allow]));
        // no allow at all is still a denial
        assert!(!e.reduce([Indeterminate, Indeterminate]));
        assert!(!e.reduce([]));
    }

    #[test]
    fn test_priority() {
        use Effect::*;
        let e = Effector::Priority;
        assert!(e.reduce([Indeterminate, Allow, Deny]));
        assert!(!e.reduce([Indeterminate, Deny, Allow]));
        assert!(!e.reduce([Indeterminate, Indeterminate]));
        assert!(!e.reduce([]));
    }

    /// Wrap a stream so we can observe how far the reducer consumed it.
    fn counted<'a>(
        effects: &'a [Effect],
        consumed: &'a Cell<usize>,
    ) -> impl Iterator<Item = Effect> + 'a {
        effects.iter().map(move |e| {
            consumed.set(consumed.get() + 1);
            *e
        })
    }

    #[test]
    fn test_allow_override_short_circuits() {
        use Effect::*;
        let consumed = Cell::new(0);
        let stream = [Indeterminate, Allow, Deny, Deny];
        assert!(Effector::AllowOverride.reduce(counted(&stream, &consumed)));
        assert_eq!(consumed.get(), 2);
    }

    #[test]
    fn test_deny_override_short_circuits() {
        use Effect::*;
        let consumed = Cell::new(0);
        let stream = [Allow, Deny, Allow, Allow];
        assert!(!Effector::DenyOverride.reduce(counted(&stream, &consumed)));
        assert_eq!(consumed.get(), 2);
    }

    #[test]
    fn test_priority_short_circuits() {
        use Effect::*;
        let consumed = Cell::new(0);
        let stream = [Indeterminate, Deny, Allow];
        assert!(!Effector::Priority.reduce(counted(&stream, &consumed)));
        assert_eq!(consumed.get(), 2);
    }
}
