//! Deterministic rendering of call arguments into a stable key fragment.
//!
//! The key builder accepts arguments of arbitrary shape. [`RenderValue`] is
//! the small sum type that dynamic dispatch collapses onto: one variant per
//! primitive, one for an ordered composite (tuple/array/list), one for a
//! keyed composite (map/struct). A composite renders deterministically by
//! sorting its keys, so semantically equal composites always produce the
//! same string regardless of construction order.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::CacheError;

/// A renderable argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(u64), // bit pattern of an f64, so RenderValue can derive PartialEq
    Str(String),
    Ordered(Vec<RenderValue>),
    Keyed(BTreeMap<String, RenderValue>),
}

impl RenderValue {
    /// Build a float variant from an `f64`, preserving bit-for-bit identity.
    pub fn float(v: f64) -> Self {
        RenderValue::Float(v.to_bits())
    }

    /// Render this value into the stable textual fragment used inside a
    /// cache key. Deterministic: equal values always render identically,
    /// and a keyed composite's entries are visited in sorted key order.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out);
        out
    }

    fn render_into(&self, out: &mut String) {
        match self {
            RenderValue::Null => out.push_str("null"),
            RenderValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            RenderValue::Int(i) => {
                let _ = write!(out, "{i}");
            }
            RenderValue::UInt(u) => {
                let _ = write!(out, "{u}");
            }
            RenderValue::Float(bits) => {
                let _ = write!(out, "{}", f64::from_bits(*bits));
            }
            RenderValue::Str(s) => out.push_str(s),
            RenderValue::Ordered(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.render_into(out);
                }
                out.push(']');
            }
            RenderValue::Keyed(map) => {
                // BTreeMap already iterates in sorted key order.
                out.push('{');
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(k);
                    out.push(':');
                    v.render_into(out);
                }
                out.push('}');
            }
        }
    }
}

/// Implemented by argument types the key builder can render deterministically.
///
/// A type that cannot be rendered (circular reference, opaque handle) should
/// not implement this trait; the key builder's caller is then expected to
/// supply a key function instead, per the key-derivation error policy.
pub trait ToRenderValue {
    fn to_render_value(&self) -> Result<RenderValue, CacheError>;
}

macro_rules! impl_render_int {
    ($($t:ty),*) => {
        $(impl ToRenderValue for $t {
            fn to_render_value(&self) -> Result<RenderValue, CacheError> {
                Ok(RenderValue::Int(*self as i64))
            }
        })*
    };
}

macro_rules! impl_render_uint {
    ($($t:ty),*) => {
        $(impl ToRenderValue for $t {
            fn to_render_value(&self) -> Result<RenderValue, CacheError> {
                Ok(RenderValue::UInt(*self as u64))
            }
        })*
    };
}

impl_render_int!(i8, i16, i32, i64, isize);
impl_render_uint!(u8, u16, u32, u64, usize);

impl ToRenderValue for f32 {
    fn to_render_value(&self) -> Result<RenderValue, CacheError> {
        Ok(RenderValue::float(*self as f64))
    }
}

impl ToRenderValue for f64 {
    fn to_render_value(&self) -> Result<RenderValue, CacheError> {
        Ok(RenderValue::float(*self))
    }
}

impl ToRenderValue for bool {
    fn to_render_value(&self) -> Result<RenderValue, CacheError> {
        Ok(RenderValue::Bool(*self))
    }
}

impl ToRenderValue for str {
    fn to_render_value(&self) -> Result<RenderValue, CacheError> {
        Ok(RenderValue::Str(self.to_string()))
    }
}

impl ToRenderValue for String {
    fn to_render_value(&self) -> Result<RenderValue, CacheError> {
        Ok(RenderValue::Str(self.clone()))
    }
}

impl<T: ToRenderValue> ToRenderValue for &T {
    fn to_render_value(&self) -> Result<RenderValue, CacheError> {
        (*self).to_render_value()
    }
}

impl<T: ToRenderValue> ToRenderValue for Option<T> {
    fn to_render_value(&self) -> Result<RenderValue, CacheError> {
        match self {
            Some(v) => v.to_render_value(),
            None => Ok(RenderValue::Null),
        }
    }
}

impl<T: ToRenderValue> ToRenderValue for Vec<T> {
    fn to_render_value(&self) -> Result<RenderValue, CacheError> {
        let items = self
            .iter()
            .map(|v| v.to_render_value())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RenderValue::Ordered(items))
    }
}

impl<T: ToRenderValue> ToRenderValue for [T] {
    fn to_render_value(&self) -> Result<RenderValue, CacheError> {
        let items = self
            .iter()
            .map(|v| v.to_render_value())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RenderValue::Ordered(items))
    }
}

impl<T: ToRenderValue> ToRenderValue for BTreeMap<String, T> {
    fn to_render_value(&self) -> Result<RenderValue, CacheError> {
        let mut map = BTreeMap::new();
        for (k, v) in self {
            map.insert(k.clone(), v.to_render_value()?);
        }
        Ok(RenderValue::Keyed(map))
    }
}

impl<T: ToRenderValue> ToRenderValue for std::collections::HashMap<String, T> {
    fn to_render_value(&self) -> Result<RenderValue, CacheError> {
        // Sorted via BTreeMap so two HashMaps with the same entries in a
        // different insertion/iteration order render identically.
        let mut map = BTreeMap::new();
        for (k, v) in self {
            map.insert(k.clone(), v.to_render_value()?);
        }
        Ok(RenderValue::Keyed(map))
    }
}
