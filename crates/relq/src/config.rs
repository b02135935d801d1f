use std::collections::HashMap;
use std::sync::LazyLock;

use crate::errors::{RelqError, Result, usage};
use crate::scalar::ScalarValue;

pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 1000;

/// Configuration for running queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryConfig {
    /// Maximum number of iterations for a recursive table expression.
    pub max_recursion_depth: usize,
    /// Maximum number of rows a product may produce in one realization. Zero
    /// means unlimited.
    pub max_product_rows: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        QueryConfig {
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
            max_product_rows: 0,
        }
    }
}

impl QueryConfig {
    pub fn set_from_scalar(&mut self, name: &str, value: ScalarValue) -> Result<()> {
        let func = setting_functions(name)?;
        (func.set)(value, self)
    }

    pub fn get_as_scalar(&self, name: &str) -> Result<ScalarValue> {
        let func = setting_functions(name)?;
        Ok((func.get)(self))
    }

    /// Reset a single setting to its default.
    pub fn reset(&mut self, name: &str) -> Result<()> {
        let func = setting_functions(name)?;
        let scalar = (func.get)(&Self::default());
        (func.set)(scalar, self)
    }

    /// Names and descriptions of all settings, sorted by name.
    pub fn settings() -> Vec<(&'static str, &'static str)> {
        let mut settings: Vec<_> = GET_SET_FUNCTIONS
            .iter()
            .map(|(name, func)| (*name, func.description))
            .collect();
        settings.sort_unstable();
        settings
    }
}

fn setting_functions(name: &str) -> Result<&'static SettingFunctions> {
    GET_SET_FUNCTIONS
        .get(name)
        .ok_or_else(|| usage!("missing setting for '{name}'"))
}

struct SettingFunctions {
    description: &'static str,
    set: fn(scalar: ScalarValue, conf: &mut QueryConfig) -> Result<()>,
    get: fn(conf: &QueryConfig) -> ScalarValue,
}

impl SettingFunctions {
    const fn new<S: QuerySetting>() -> Self {
        SettingFunctions {
            description: S::DESCRIPTION,
            set: S::set_from_scalar as _,
            get: S::get_as_scalar as _,
        }
    }
}

fn insert_setting<S: QuerySetting>(map: &mut HashMap<&'static str, SettingFunctions>) {
    if map.insert(S::NAME, SettingFunctions::new::<S>()).is_some() {
        panic!("Duplicate settings names: {}", S::NAME);
    }
}

static GET_SET_FUNCTIONS: LazyLock<HashMap<&'static str, SettingFunctions>> = LazyLock::new(|| {
    let mut map = HashMap::new();

    insert_setting::<MaxRecursionDepth>(&mut map);
    insert_setting::<MaxProductRows>(&mut map);

    map
});

pub trait QuerySetting: Sync + Send + 'static {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;

    fn set_from_scalar(scalar: ScalarValue, conf: &mut QueryConfig) -> Result<()>;
    fn get_as_scalar(conf: &QueryConfig) -> ScalarValue;
}

fn scalar_as_usize(scalar: &ScalarValue) -> Result<usize> {
    let val = scalar.as_i64()?;
    usize::try_from(val).map_err(|_| RelqError::TypeMismatch {
        expected: "non-negative integer",
        got: val.to_string(),
    })
}

pub struct MaxRecursionDepth;

impl QuerySetting for MaxRecursionDepth {
    const NAME: &'static str = "max_recursion_depth";
    const DESCRIPTION: &'static str = "Maximum number of iterations of a recursive table expression";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut QueryConfig) -> Result<()> {
        let val = scalar_as_usize(&scalar)?;
        if val == 0 {
            return Err(usage!("max_recursion_depth cannot be zero"));
        }
        conf.max_recursion_depth = val;
        Ok(())
    }

    fn get_as_scalar(conf: &QueryConfig) -> ScalarValue {
        conf.max_recursion_depth.into()
    }
}

pub struct MaxProductRows;

impl QuerySetting for MaxProductRows {
    const NAME: &'static str = "max_product_rows";
    const DESCRIPTION: &'static str = "Maximum number of rows produced by joining sources, zero for no limit";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut QueryConfig) -> Result<()> {
        conf.max_product_rows = scalar_as_usize(&scalar)?;
        Ok(())
    }

    fn get_as_scalar(conf: &QueryConfig) -> ScalarValue {
        conf.max_product_rows.into()
    }
}
