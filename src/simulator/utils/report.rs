use crate::arch::dirconv::RunSummary;
use crate::simulator::sim::records::EngineRecord;

pub fn print_records(title: &str, records: &[EngineRecord]) {
  if records.is_empty() {
    return;
  }
  println!("\n[{}]", title);
  for record in records {
    println!("  Step {:>8}: {:<14} {}", record.step, record.action, record.subject);
  }
}

/// Aggregate over every invocation of a job.
#[derive(Debug, Clone, Default)]
pub struct JobReport {
  pub invocations: usize,
  pub passes: usize,
  pub batches: usize,
  pub mac_steps: u64,
  pub lanes_stored: usize,
  /// `None` when verification was skipped.
  pub max_abs_error: Option<f32>,
  pub mismatches: usize,
  /// Set when the job was stopped from the step shell.
  pub aborted: bool,
}

impl JobReport {
  pub fn absorb(&mut self, summary: &RunSummary) {
    self.invocations += 1;
    self.passes += summary.passes;
    self.batches += summary.batches;
    self.mac_steps += summary.mac_steps;
    self.lanes_stored += summary.lanes_stored;
  }

  pub fn passed(&self) -> bool {
    !self.aborted && self.mismatches == 0
  }
}

pub fn print_report(report: &JobReport) {
  println!("\n--- Job Report ---");
  println!("  invocations : {}", report.invocations);
  println!("  passes      : {}", report.passes);
  println!("  batches     : {}", report.batches);
  println!("  mac steps   : {}", report.mac_steps);
  println!("  lanes stored: {}", report.lanes_stored);
  match report.max_abs_error {
    Some(err) => println!("  verify      : max |err| = {:.3e}, mismatches = {}", err, report.mismatches),
    None => println!("  verify      : skipped"),
  }
  if report.aborted {
    println!("  status      : aborted");
  }
  println!("--- End Report ---\n");
}
