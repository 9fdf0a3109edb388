//! Cache Key Module
//!
//! Derives stable, filesystem-safe cache keys from a function identity and
//! its canonicalized call arguments.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::KeyError;
use crate::KEY_DIGEST_CHARS;

// == Function Identity ==
/// Fully qualified identity of a cached function.
///
/// Two functions with the same short name in different modules get distinct
/// identities, and therefore distinct cache keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionId {
    qualified: String,
}

impl FunctionId {
    /// Creates an identity from a module path and a function name.
    ///
    /// The [`function_id!`](crate::function_id) macro fills in the module
    /// path at the call site.
    pub fn new(module_path: &str, name: &str) -> Self {
        let qualified = if module_path.is_empty() {
            name.to_string()
        } else {
            format!("{module_path}::{name}")
        };
        Self { qualified }
    }

    /// The full `module::path::name` form.
    pub fn qualified(&self) -> &str {
        &self.qualified
    }

    /// The short function name, used as the readable key prefix.
    pub fn name(&self) -> &str {
        self.qualified
            .rsplit("::")
            .next()
            .unwrap_or(&self.qualified)
    }
}

/// Builds a [`FunctionId`] for a function in the current module.
#[macro_export]
macro_rules! function_id {
    ($name:expr) => {
        $crate::key::FunctionId::new(module_path!(), $name)
    };
}

// == Call Arguments ==
/// Named arguments of a single call, canonicalized to JSON at insertion.
///
/// The name-sorted map makes argument order irrelevant to the derived key.
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    values: BTreeMap<String, Value>,
}

impl CallArgs {
    /// Creates an empty argument set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one named argument, canonicalizing it to JSON.
    ///
    /// Fails with [`KeyError::Unserializable`] when the value has no JSON
    /// form; this happens before any storage or computation is touched.
    pub fn arg<T: Serialize>(mut self, name: &str, value: &T) -> Result<Self, KeyError> {
        let canonical = serde_json::to_value(value).map_err(|source| KeyError::Unserializable {
            parameter: name.to_string(),
            source,
        })?;
        self.values.insert(name.to_string(), canonical);
        Ok(self)
    }

    /// Number of named arguments.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when no arguments were added.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

// == Function Call ==
/// One invocation to be cached: the function identity plus its arguments.
#[derive(Debug, Clone)]
pub struct FnCall {
    pub function: FunctionId,
    pub args: CallArgs,
}

impl FnCall {
    /// Creates a call with no arguments.
    pub fn new(function: FunctionId) -> Self {
        Self {
            function,
            args: CallArgs::new(),
        }
    }

    /// Creates a call with a prepared argument set.
    pub fn with_args(function: FunctionId, args: CallArgs) -> Self {
        Self { function, args }
    }

    /// Adds one named argument. See [`CallArgs::arg`].
    pub fn arg<T: Serialize>(mut self, name: &str, value: &T) -> Result<Self, KeyError> {
        self.args = self.args.arg(name, value)?;
        Ok(self)
    }
}

// == Cache Key ==
/// Stable, filesystem-safe identifier derived from a call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// == Key Builder ==
/// Derives the cache key for one call.
///
/// The key is the sanitized short function name followed by a truncated
/// SHA-256 digest over the qualified name and the included arguments in name
/// order. When `key_parameters` is given, only the listed argument names
/// participate; a listed name absent from the call contributes nothing.
///
/// # Arguments
/// * `call` - The function identity and its canonicalized arguments
/// * `key_parameters` - Optional allow-list of argument names
pub fn build_key(call: &FnCall, key_parameters: Option<&[String]>) -> Result<CacheKey, KeyError> {
    let mut hasher = Sha256::new();
    hasher.update(call.function.qualified().as_bytes());

    for (name, value) in call.args.iter() {
        if let Some(included) = key_parameters {
            if !included.iter().any(|p| p == name) {
                continue;
            }
        }
        hasher.update([0u8]);
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        // Display of a JSON value is its compact encoding.
        hasher.update(value.to_string().as_bytes());
    }

    let digest = hex::encode(hasher.finalize());
    let key = format!(
        "{}_{}",
        sanitize(call.function.name()),
        &digest[..KEY_DIGEST_CHARS]
    );
    Ok(CacheKey(key))
}

/// Maps a function name onto the filesystem-safe alphabet.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
