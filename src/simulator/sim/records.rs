use serde::{Deserialize, Serialize};

/// One observable action of the engine. `step` is the cumulative MAC step count
/// of the invocation when the action happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineRecord {
  pub step: u64,
  pub action: String,
  pub subject: String,
}

/// Macro to push an EngineRecord with common fields
///
/// Usage:
/// ```ignore
/// engine_record!(records, step, "action_name", "subject string");
/// engine_record!(records, step, "action_name", format!("formatted {}", value));
/// ```
#[macro_export]
macro_rules! engine_record {
  ($records:expr, $step:expr, $action:expr, $subject:expr) => {
    $records.push($crate::simulator::sim::records::EngineRecord {
      step: $step as u64,
      action: $action.to_string(),
      subject: $subject.to_string(),
    });
  };
}
