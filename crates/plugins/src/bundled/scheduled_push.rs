//! `scheduled-push`: turns `scheduled_tasks` entries into scheduled tasks.

use std::collections::BTreeMap;

use {async_trait::async_trait, chatrelay_config::ScheduledTaskConfig};

use crate::{Capability, Plugin, PluginInfo, ScheduledTask};

pub const NAME: &str = "scheduled-push";

pub struct ScheduledPushPlugin {
    tasks: Vec<ScheduledTask>,
}

impl ScheduledPushPlugin {
    /// Enabled tasks only, in key order.
    pub fn from_config(tasks: &BTreeMap<String, ScheduledTaskConfig>) -> Self {
        let tasks = tasks
            .iter()
            .filter(|(_, cfg)| cfg.enabled)
            .map(|(name, cfg)| ScheduledTask {
                name: name.clone(),
                schedule: cfg.schedule.clone(),
                conversations: cfg.conversations.clone(),
                text: cfg.text.clone(),
            })
            .collect();
        Self { tasks }
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[async_trait]
impl Plugin for ScheduledPushPlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo::new(NAME, env!("CARGO_PKG_VERSION"))
            .with_description("Pushes configured messages on a schedule")
            .with_author("chatrelay")
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability::Scheduled(self.tasks.clone())]
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*, crate::PluginRegistry, chatrelay_common::EventBus,
        chatrelay_config::ScheduleSpec, std::sync::Arc,
    };

    fn task(enabled: bool) -> ScheduledTaskConfig {
        ScheduledTaskConfig {
            enabled,
            schedule: ScheduleSpec::Every {
                every: "30m".into(),
            },
            conversations: vec!["g1".into()],
            text: "/ping".into(),
        }
    }

    #[tokio::test]
    async fn exposes_enabled_tasks() {
        let tasks = BTreeMap::from([("morning".to_string(), task(true)), ("off".to_string(), task(false))]);
        let mut registry = PluginRegistry::new(EventBus::new());
        registry
            .register(Arc::new(ScheduledPushPlugin::from_config(&tasks)))
            .await
            .unwrap();

        let registered = registry.scheduled_tasks();
        assert_eq!(registered.len(), 1);
        assert_eq!(registered[0].qualified_name(), "scheduled-push.morning");
    }

    #[test]
    fn empty_when_all_disabled() {
        let tasks = BTreeMap::from([("off".to_string(), task(false))]);
        assert!(ScheduledPushPlugin::from_config(&tasks).is_empty());
    }
}
