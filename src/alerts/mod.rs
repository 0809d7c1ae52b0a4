pub mod actions;
pub mod alert;
pub mod conditions;
pub mod executor;
pub mod lock;
pub mod notifications;
pub mod query;
pub mod rules;
pub mod store;
pub mod system;

pub use actions::{ActionKind, AlertAction, AlertTransition, HttpMethod};
pub use alert::{Alert, AlertResponse, PendingRetry, ResponseStatus};
pub use conditions::{ActionCondition, Comparator, ConditionOperator};
pub use executor::{ActionError, ActionExecutor, ActionRunner, DryRunRunner, LiveRunner};
pub use lock::DaemonLock;
pub use notifications::{NotificationChannel, NotificationDispatcher};
pub use query::{AlertFilter, AlertSummary};
pub use rules::{AlertCategory, AlertRule, AlertRuleUpdate, EscalationRule, Severity};
pub use store::{AlertStore, PersistedState};
pub use system::{AlertingSystem, EngineSettings, SubscriptionId, TickReport};
