use crate::error::{HarnessError, Result};
use crate::unit::TestUnit;
use std::collections::HashMap;
use std::sync::Arc;

/// 测试单元构造器
pub type UnitFactory = Arc<dyn Fn() -> Box<dyn TestUnit> + Send + Sync>;

/// Ordered, read-only mapping from test name to unit constructor.
///
/// Built once through [`RegistryBuilder`]; there is no way to add entries
/// afterwards. Names are case-sensitive and unique.
#[derive(Clone, Default)]
pub struct TestRegistry {
    entries: Vec<(String, UnitFactory)>,
    index: HashMap<String, usize>,
}

impl TestRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// 按名称查找构造器，不存在时返回 `UnknownTest`
    pub fn resolve(&self, name: &str) -> Result<&UnitFactory> {
        self.index
            .get(name)
            .map(|&i| &self.entries[i].1)
            .ok_or_else(|| HarnessError::UnknownTest(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// 注册顺序的测试名称
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// 注册顺序的 (名称, 构造器)
    pub fn entries(&self) -> impl Iterator<Item = (&str, &UnitFactory)> {
        self.entries
            .iter()
            .map(|(name, factory)| (name.as_str(), factory))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Registration phase of a [`TestRegistry`].
#[derive(Default)]
pub struct RegistryBuilder {
    entries: Vec<(String, UnitFactory)>,
    index: HashMap<String, usize>,
}

impl RegistryBuilder {
    /// Register a constructor under `name`.
    ///
    /// Fails on a duplicate name instead of overwriting the earlier entry,
    /// and on names that cannot be used as a log file stem.
    pub fn register<F, U>(self, name: impl Into<String>, factory: F) -> Result<Self>
    where
        F: Fn() -> U + Send + Sync + 'static,
        U: TestUnit + 'static,
    {
        let factory: UnitFactory = Arc::new(move || Box::new(factory()) as Box<dyn TestUnit>);
        self.register_factory(name, factory)
    }

    pub fn register_factory(mut self, name: impl Into<String>, factory: UnitFactory) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;

        if self.index.contains_key(&name) {
            return Err(HarnessError::DuplicateTest(name));
        }

        self.index.insert(name.clone(), self.entries.len());
        self.entries.push((name, factory));
        Ok(self)
    }

    pub fn build(self) -> TestRegistry {
        TestRegistry {
            entries: self.entries,
            index: self.index,
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    let reserved = name.is_empty() || name == "all" || name == "." || name == "..";
    let bad_char = name
        .chars()
        .any(|c| c == '/' || c == '\\' || c.is_whitespace() || c.is_control());

    if reserved || bad_char {
        return Err(HarnessError::InvalidTestName(name.to_string()));
    }
    Ok(())
}
