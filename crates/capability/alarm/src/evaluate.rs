//! 告警判定（纯函数）
//!
//! 实时链路与手动检查共用同一判定路径，保证两者结论一致。

use domain::{AlarmRule, DataPointConfig, Severity};

/// 内置限值的四个键后缀，顺序即优先级。
const BUILTIN_SUFFIXES: [&str; 4] = ["high", "warning_high", "low", "warning_low"];

/// 待触发的告警。
#[derive(Debug, Clone, PartialEq)]
pub struct AlarmCandidate {
    pub alarm_key: String,
    pub severity: Severity,
    pub message: String,
    pub threshold: Option<f64>,
}

/// 单个告警键的状态迁移。
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Trigger(AlarmCandidate),
    Clear(String),
}

impl Transition {
    pub fn alarm_key(&self) -> &str {
        match self {
            Self::Trigger(candidate) => &candidate.alarm_key,
            Self::Clear(key) => key,
        }
    }
}

pub fn builtin_key(data_point_id: &str, suffix: &str) -> String {
    format!("builtin_{}_{}", data_point_id, suffix)
}

/// 对一个读数求出全部迁移：先内置限值，再按作用域匹配的自定义规则。
pub fn evaluate(
    point: &DataPointConfig,
    station_id: &str,
    value: f64,
    rules: &[AlarmRule],
) -> Vec<Transition> {
    let mut transitions = evaluate_builtin(point, value);
    for rule in rules
        .iter()
        .filter(|rule| rule.is_active)
        .filter(|rule| rule.scope.applies_to(&point.id, &point.device_id, station_id))
    {
        let alarm_key = rule.alarm_key(&point.id);
        if rule
            .condition
            .evaluate(value, rule.threshold1, rule.threshold2)
        {
            transitions.push(Transition::Trigger(AlarmCandidate {
                alarm_key,
                severity: rule.severity,
                message: rule_message(rule, point, value),
                threshold: Some(rule.threshold1),
            }));
        } else {
            transitions.push(Transition::Clear(alarm_key));
        }
    }
    transitions
}

/// 内置限值按优先级取第一个命中的条件，只触发该键。
///
/// 均未命中时才清除四个内置键；从严重降到警告时，严重告警保持到回落正常。
fn evaluate_builtin(point: &DataPointConfig, value: f64) -> Vec<Transition> {
    let name = point.display_name();
    let unit = point.unit.as_deref().unwrap_or("");
    let fired = point
        .alarm_high
        .filter(|limit| value >= *limit)
        .map(|limit| (0, Severity::Critical, limit, "high alarm", ">="))
        .or_else(|| {
            point
                .warning_high
                .filter(|limit| value >= *limit)
                .map(|limit| (1, Severity::Warning, limit, "high warning", ">="))
        })
        .or_else(|| {
            point
                .alarm_low
                .filter(|limit| value <= *limit)
                .map(|limit| (2, Severity::Critical, limit, "low alarm", "<="))
        })
        .or_else(|| {
            point
                .warning_low
                .filter(|limit| value <= *limit)
                .map(|limit| (3, Severity::Warning, limit, "low warning", "<="))
        });

    match fired {
        Some((index, severity, limit, label, op)) => vec![Transition::Trigger(AlarmCandidate {
            alarm_key: builtin_key(&point.id, BUILTIN_SUFFIXES[index]),
            severity,
            message: format!("{} {}: {}{} {} {}{}", name, label, value, unit, op, limit, unit),
            threshold: Some(limit),
        })],
        None => BUILTIN_SUFFIXES
            .iter()
            .map(|suffix| Transition::Clear(builtin_key(&point.id, suffix)))
            .collect(),
    }
}

fn rule_message(rule: &AlarmRule, point: &DataPointConfig, value: f64) -> String {
    let rule_name = if rule.name.is_empty() {
        rule.id.as_str()
    } else {
        rule.name.as_str()
    };
    match rule.threshold2 {
        Some(upper) => format!(
            "{}: {} = {} {} [{}, {}]",
            rule_name,
            point.display_name(),
            value,
            rule.condition.as_str(),
            rule.threshold1,
            upper
        ),
        None => format!(
            "{}: {} = {} {} {}",
            rule_name,
            point.display_name(),
            value,
            rule.condition.as_str(),
            rule.threshold1
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{RuleCondition, RuleScope};

    fn voltage() -> DataPointConfig {
        let mut point = DataPointConfig::new("p-v", "dev-1", 0);
        point.alarm_high = Some(240.0);
        point.warning_high = Some(230.0);
        point.alarm_low = Some(200.0);
        point.warning_low = Some(210.0);
        point
    }

    fn triggered(transitions: &[Transition]) -> Vec<&str> {
        transitions
            .iter()
            .filter_map(|t| match t {
                Transition::Trigger(c) => Some(c.alarm_key.as_str()),
                Transition::Clear(_) => None,
            })
            .collect()
    }

    #[test]
    fn alarm_high_wins_over_warning_high() {
        let transitions = evaluate(&voltage(), "st-1", 245.0, &[]);
        assert_eq!(triggered(&transitions), vec!["builtin_p-v_high"]);
        // 命中时不清除其他内置键
        assert_eq!(transitions.len(), 1);
    }

    #[test]
    fn limits_are_inclusive() {
        let transitions = evaluate(&voltage(), "st-1", 230.0, &[]);
        assert_eq!(triggered(&transitions), vec!["builtin_p-v_warning_high"]);
        let transitions = evaluate(&voltage(), "st-1", 200.0, &[]);
        assert_eq!(triggered(&transitions), vec!["builtin_p-v_low"]);
    }

    #[test]
    fn normal_value_clears_all_builtin_keys() {
        let transitions = evaluate(&voltage(), "st-1", 220.0, &[]);
        assert!(triggered(&transitions).is_empty());
        let cleared: Vec<_> = transitions.iter().map(|t| t.alarm_key()).collect();
        assert_eq!(
            cleared,
            vec![
                "builtin_p-v_high",
                "builtin_p-v_warning_high",
                "builtin_p-v_low",
                "builtin_p-v_warning_low"
            ]
        );
    }

    #[test]
    fn rules_outside_scope_are_ignored() {
        let rule = AlarmRule {
            id: "r1".to_string(),
            name: String::new(),
            scope: RuleScope::Station("st-2".to_string()),
            condition: RuleCondition::Gt,
            threshold1: 0.0,
            threshold2: None,
            severity: Severity::Info,
            is_active: true,
        };
        let point = DataPointConfig::new("p-x", "dev-1", 1);
        // 未配置限值：四个内置键均为清除
        assert!(evaluate(&point, "st-1", 10.0, std::slice::from_ref(&rule))
            .iter()
            .all(|t| matches!(t, Transition::Clear(key) if key.starts_with("builtin_"))));

        let transitions = evaluate(&point, "st-2", 10.0, &[rule]);
        assert_eq!(triggered(&transitions), vec!["rule_r1_p-x"]);
    }
}
