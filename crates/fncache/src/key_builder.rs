//! Deterministic cache-key composition from a procedure identity, its
//! rendered call arguments, and the current version counters.

use fncache_core::{RenderValue, ToRenderValue};

/// One call's rendered arguments, built incrementally via [`CallArgs::arg`].
///
/// An argument that cannot be rendered (circular reference, opaque handle)
/// marks the whole set as *degraded*: the wrapper's policy for a degraded
/// call is to skip the cache entirely rather than fail the call.
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    pairs: Vec<(String, RenderValue)>,
    degraded: bool,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named argument. Rendering failure does not panic or return an
    /// error here; it marks the call degraded so the caller (the invocation
    /// wrapper) can apply the key-derivation error policy of skipping the
    /// cache for this one call.
    pub fn arg(mut self, name: impl Into<String>, value: &impl ToRenderValue) -> Self {
        match value.to_render_value() {
            Ok(rendered) => self.pairs.push((name.into(), rendered)),
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %err, "argument is not renderable; skipping cache for this call");
                #[cfg(not(feature = "tracing"))]
                let _ = err;
                self.degraded = true;
            }
        }
        self
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn pairs(&self) -> &[(String, RenderValue)] {
        &self.pairs
    }
}

/// The args portion of a composed key, after the selector-list / key-function
/// tie-break has been resolved.
#[derive(Debug, Clone)]
pub enum ArgsFragment {
    /// No arguments participate in the key.
    None,
    /// Named arguments, rendered as `:name=value` segments in order.
    Named(Vec<(String, RenderValue)>),
    /// A caller-supplied key function already produced the whole fragment.
    Custom(String),
}

/// Resolve which argument set actually goes into the key, applying the
/// tie-break rule: a key function wins over a selector list; a selector
/// list, if present, drops everything not named; absent both, every
/// argument participates in call order.
pub fn resolve_fragment(
    call_args: &CallArgs,
    selector: Option<&[String]>,
    key_fn: Option<&(dyn Fn(&CallArgs) -> String + Send + Sync)>,
) -> ArgsFragment {
    if let Some(key_fn) = key_fn {
        return ArgsFragment::Custom(key_fn(call_args));
    }
    if let Some(selector) = selector {
        let filtered = call_args
            .pairs()
            .iter()
            .filter(|(name, _)| selector.iter().any(|s| s == name))
            .cloned()
            .collect::<Vec<_>>();
        return ArgsFragment::Named(filtered);
    }
    if call_args.pairs().is_empty() {
        ArgsFragment::None
    } else {
        ArgsFragment::Named(call_args.pairs().to_vec())
    }
}

/// Composes the literal key template: `{prefix}{procedure_id}[:{arg}={value}]*@g{global}[@u{uid}:{user}]`.
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    prefix: String,
}

impl KeyBuilder {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn build(
        &self,
        procedure_id: &str,
        fragment: &ArgsFragment,
        global_version: u64,
        user: Option<(&str, u64)>,
    ) -> String {
        let mut key = String::with_capacity(64);
        key.push_str(&self.prefix);
        key.push_str(procedure_id);

        match fragment {
            ArgsFragment::None => {}
            ArgsFragment::Custom(fragment) => {
                key.push(':');
                key.push_str(fragment);
            }
            ArgsFragment::Named(pairs) => {
                for (name, value) in pairs {
                    key.push(':');
                    key.push_str(name);
                    key.push('=');
                    key.push_str(&value.render());
                }
            }
        }

        key.push_str("@g");
        key.push_str(&global_version.to_string());

        if let Some((user_id, user_version)) = user {
            key.push_str("@u");
            key.push_str(user_id);
            key.push(':');
            key.push_str(&user_version.to_string());
        }

        key
    }
}
