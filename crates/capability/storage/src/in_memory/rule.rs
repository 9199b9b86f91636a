//! 告警规则内存实现

use crate::error::StorageError;
use crate::traits::AlarmRuleStore;
use domain::AlarmRule;
use std::sync::RwLock;

/// 告警规则内存存储
#[derive(Default)]
pub struct InMemoryAlarmRuleStore {
    rules: RwLock<Vec<AlarmRule>>,
}

impl InMemoryAlarmRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: Vec<AlarmRule>) -> Self {
        Self {
            rules: RwLock::new(rules),
        }
    }

    /// 新增或替换同 ID 规则
    pub fn upsert_rule(&self, rule: AlarmRule) -> Result<(), StorageError> {
        let mut rules = self
            .rules
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        match rules.iter_mut().find(|r| r.id == rule.id) {
            Some(existing) => *existing = rule,
            None => rules.push(rule),
        }
        Ok(())
    }

    pub fn remove_rule(&self, rule_id: &str) -> Result<bool, StorageError> {
        let mut rules = self
            .rules
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let before = rules.len();
        rules.retain(|r| r.id != rule_id);
        Ok(rules.len() != before)
    }
}

#[async_trait::async_trait]
impl AlarmRuleStore for InMemoryAlarmRuleStore {
    async fn list_active_rules(&self) -> Result<Vec<AlarmRule>, StorageError> {
        let rules = self
            .rules
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(rules.iter().filter(|r| r.is_active).cloned().collect())
    }
}
