//! Metric name constants grouped by subsystem.

/// Event bus metrics
pub mod events {
    /// Events published, by kind
    pub const PUBLISHED_TOTAL: &str = "chatrelay_events_published_total";
    /// Subscriber failures, by originating kind
    pub const HANDLER_FAILURES_TOTAL: &str = "chatrelay_event_handler_failures_total";
}

/// Message pipeline metrics
pub mod pipeline {
    /// Messages accepted at intake
    pub const MESSAGES_RECEIVED_TOTAL: &str = "chatrelay_pipeline_messages_received_total";
    /// Contexts that reached a terminal stage, by stage
    pub const TERMINAL_TOTAL: &str = "chatrelay_pipeline_terminal_total";
    /// End-to-end processing duration in seconds
    pub const PROCESSING_DURATION_SECONDS: &str = "chatrelay_pipeline_processing_duration_seconds";
    /// Outbound delivery failures
    pub const DELIVERY_FAILURES_TOTAL: &str = "chatrelay_pipeline_delivery_failures_total";
}

/// Plugin registry metrics
pub mod plugins {
    /// Registered plugins
    pub const LOADED: &str = "chatrelay_plugins_loaded";
    /// Command dispatches, by command
    pub const COMMANDS_TOTAL: &str = "chatrelay_plugin_commands_total";
    /// Command handler failures, by plugin
    pub const FAILURES_TOTAL: &str = "chatrelay_plugin_failures_total";
}

/// AI routing metrics
pub mod routing {
    /// Provider completions requested, by model
    pub const COMPLETIONS_TOTAL: &str = "chatrelay_routing_completions_total";
    /// Provider failures (including timeouts), by model
    pub const FAILURES_TOTAL: &str = "chatrelay_routing_failures_total";
    /// Configuration rejections before any provider call
    pub const CONFIG_REJECTIONS_TOTAL: &str = "chatrelay_routing_config_rejections_total";
    /// Provider latency in seconds
    pub const COMPLETION_DURATION_SECONDS: &str = "chatrelay_routing_completion_duration_seconds";
}

/// Scheduler metrics
pub mod scheduler {
    /// Scheduled tasks known to the scheduler
    pub const TASKS: &str = "chatrelay_scheduler_tasks";
    /// Ticks fired
    pub const TICKS_TOTAL: &str = "chatrelay_scheduler_ticks_total";
    /// Synthetic messages that could not be enqueued
    pub const INJECT_FAILURES_TOTAL: &str = "chatrelay_scheduler_inject_failures_total";
}

/// Outbound channel metrics
pub mod channels {
    /// Messages handed to a transport
    pub const MESSAGES_SENT_TOTAL: &str = "chatrelay_channel_messages_sent_total";
    /// Messages rejected by the outbound rate limiter
    pub const RATE_LIMITED_TOTAL: &str = "chatrelay_channel_rate_limited_total";
}

/// Common label keys
pub mod labels {
    pub const EVENT: &str = "event";
    pub const STAGE: &str = "stage";
    pub const CONVERSATION: &str = "conversation";
    pub const COMMAND: &str = "command";
    pub const PLUGIN: &str = "plugin";
    pub const MODEL: &str = "model";
    pub const TASK: &str = "task";
}
