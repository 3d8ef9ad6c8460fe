use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use bon::Builder;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::store::StoreError;

macro_rules! set_config {
    ($slf:ident, $settings:expr, $key:ident) => {{
        match &$slf.$key {
            MaybeUnset::Unset => {},
            MaybeUnset::None => {
                info!(key = stringify!($key), "Removing config value");
                $settings.del_config_value(stringify!($key));
            },
            MaybeUnset::Some(v) => {
                info!(key = stringify!($key), value = %v, "Setting config value");
                $settings.set_config_value(stringify!($key), v);
            },
        }
    }};
}

macro_rules! get_config {
    ($slf:ident, $settings:expr, $key:ident) => {{
        $slf.$key = $settings
            .get_config_value(stringify!($key))?
            .map(MaybeUnset::Some)
            .unwrap_or(MaybeUnset::Unset)
    }};
}

macro_rules! getters_with_option {
    ($key:ident, ty = $t:ty) => {
        pub fn $key(&self) -> Option<$t> {
            match self.$key {
                MaybeUnset::Unset => None,
                MaybeUnset::None => None,
                MaybeUnset::Some(v) => Some(v),
            }
        }
    };
}

#[derive(Debug, Default)]
#[cfg_attr(test, derive(Eq, PartialEq))]
/// Represents a config option which can be:
///
/// - `None` To remove the current set value.
/// - `Unset` To leave the value as it is currently set.
/// - `Some(T)` To update the value with a new value.
pub enum MaybeUnset<T> {
    #[default]
    Unset,
    None,
    Some(T),
}

impl<T> From<T> for MaybeUnset<T> {
    fn from(value: T) -> Self {
        Self::Some(value)
    }
}

#[derive(Debug, Default, Builder)]
#[cfg_attr(test, derive(Eq, PartialEq))]
/// Configuration options that can be adjusted at runtime on the store.
///
/// Changes are persisted with the next snapshot and only take effect
/// once the store is opened again.
pub struct StoreConfig {
    #[builder(into, default, setters(vis = "pub(crate)"))]
    /// The name of the store.
    pub(crate) name: MaybeUnset<String>,
    #[builder(default, into)]
    /// The number of bits of the segment capacity, segments hold
    /// `1 << segment_width_bits` bytes.
    pub segment_width_bits: MaybeUnset<u32>,
    #[builder(default, into)]
    /// Overrides whether zlib compressed columns are reported as supported.
    ///
    /// Defaults to whether the `zlib` feature is enabled.
    pub zlib_supported: MaybeUnset<bool>,
    #[builder(default, into)]
    /// Overrides whether lzo compressed columns are reported as supported.
    ///
    /// Defaults to whether the `lzo` feature is enabled.
    pub lzo_supported: MaybeUnset<bool>,
}

impl StoreConfig {
    pub(crate) fn store_in_settings(&self, settings: &mut Settings) {
        info!("Persisting store config changes");

        set_config!(self, settings, name);
        set_config!(self, settings, segment_width_bits);
        set_config!(self, settings, zlib_supported);
        set_config!(self, settings, lzo_supported);
    }

    pub(crate) fn load_from_settings(&mut self, settings: &Settings) -> Result<(), StoreError> {
        info!("Loading store config");

        get_config!(self, settings, name);
        get_config!(self, settings, segment_width_bits);
        get_config!(self, settings, zlib_supported);
        get_config!(self, settings, lzo_supported);

        Ok(())
    }

    /// Returns the name of the store if one is set.
    pub fn name(&self) -> Option<&str> {
        match &self.name {
            MaybeUnset::Some(name) => Some(name.as_str()),
            _ => None,
        }
    }

    getters_with_option!(segment_width_bits, ty = u32);
    getters_with_option!(zlib_supported, ty = bool);
    getters_with_option!(lzo_supported, ty = bool);
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
/// The persisted key value settings of a store.
pub(crate) struct Settings(BTreeMap<String, String>);

impl Settings {
    fn set_config_value(&mut self, key: &str, value: &impl Display) {
        self.0.insert(key.to_string(), value.to_string());
    }

    fn del_config_value(&mut self, key: &str) {
        self.0.remove(key);
    }

    fn get_config_value<T: FromStr>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let Some(raw) = self.0.get(key) else {
            return Ok(None);
        };

        raw.parse()
            .map(Some)
            .map_err(|_| StoreError::Corrupted(format!("config value {key:?} is invalid: {raw:?}")))
    }
}
