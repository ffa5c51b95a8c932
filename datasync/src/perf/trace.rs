use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use datasync_config::shared::PerfTraceConfig;
use thiserror::Error;
use tracing::{debug, info};

use crate::perf::{Phase, unit_size, unit_time};

/// Summary returned when tracing is disabled.
pub const PERF_TRACE_DISABLED: &str = "PerfTrace not enabled";

const NANOS_PER_MILLI: u64 = 1_000_000;

#[derive(Debug, Error)]
pub enum PerfTraceError {
    #[error("the {0} lock is poisoned")]
    LockPoisoned(&'static str),

    #[error("failed to render the summary: {0}")]
    Format(#[from] std::fmt::Error),
}

/// Which records contribute to the reportable totals of a [`PerfReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportScope {
    /// Only phases that ended.
    Completed,
    /// Also phases still running, counted up to now.
    IncludeInFlight,
}

/// A timed phase of one task, owned by the task until it ends.
#[derive(Debug, Clone)]
struct PerfRecord {
    id: u64,
    task_group_id: u32,
    task_id: u32,
    phase: Phase,
    start: Instant,
    elapsed_nanos: u64,
    count: u64,
    size: u64,
}

/// Aggregated statistics of every ended record of one phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseStats {
    /// Number of ended records.
    pub count: u64,
    pub total_nanos: u64,
    pub min_nanos: u64,
    pub max_nanos: u64,
    /// Task group and task of the longest record.
    pub max_time_task: Option<(u32, u32)>,
    pub total_records: u64,
    pub total_bytes: u64,
    /// Highest record count of a single task, with the bytes it moved.
    pub max_records: u64,
    pub max_records_bytes: u64,
    pub max_records_task: Option<(u32, u32)>,
}

impl PhaseStats {
    fn add(&mut self, record: &PerfRecord) {
        let task = Some((record.task_group_id, record.task_id));

        self.min_nanos = if self.count == 0 {
            record.elapsed_nanos
        } else {
            self.min_nanos.min(record.elapsed_nanos)
        };
        self.total_nanos = self.total_nanos.saturating_add(record.elapsed_nanos);
        if record.elapsed_nanos >= self.max_nanos {
            self.max_nanos = record.elapsed_nanos;
            self.max_time_task = task;
        }

        self.total_records += record.count;
        self.total_bytes += record.size;
        if record.count >= self.max_records {
            self.max_records = record.count;
            self.max_records_bytes = record.size;
            self.max_records_task = task;
        }

        self.count += 1;
    }

    pub fn average_nanos(&self) -> u64 {
        self.total_nanos.checked_div(self.count).unwrap_or_default()
    }

    pub fn average_records(&self) -> u64 {
        self.total_records.checked_div(self.count).unwrap_or_default()
    }

    pub fn average_bytes(&self) -> u64 {
        self.total_bytes.checked_div(self.count).unwrap_or_default()
    }
}

/// Running totals, in milliseconds, of the reportable phases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportTotals {
    pub task_total_ms: u64,
    pub sql_query_ms: u64,
    pub result_next_ms: u64,
    pub odps_block_close_ms: u64,
}

impl ReportTotals {
    fn add(&mut self, phase: Phase, elapsed_nanos: u64) {
        let elapsed_ms = elapsed_nanos / NANOS_PER_MILLI;
        let total = match phase {
            Phase::TaskTotal => &mut self.task_total_ms,
            Phase::SqlQuery => &mut self.sql_query_ms,
            Phase::ResultNextAll => &mut self.result_next_ms,
            Phase::OdpsBlockClose => &mut self.odps_block_close_ms,
            _ => return,
        };

        *total += elapsed_ms;
    }
}

/// Structured snapshot of a [`PerfTrace`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerfReport {
    pub enabled: bool,
    pub job_id: u64,
    pub phases: BTreeMap<Phase, PhaseStats>,
    pub totals: ReportTotals,
    /// Reportable records that had not ended when the snapshot was taken.
    pub in_flight: usize,
}

#[derive(Debug)]
struct PerfTraceInner {
    job_id: u64,
    report_enabled: bool,
    batch_size: usize,
    next_record_id: AtomicU64,
    /// Ended records waiting to be folded into `phases`.
    pending: Mutex<Vec<PerfRecord>>,
    phases: Mutex<BTreeMap<Phase, PhaseStats>>,
    /// Started reportable records that did not end yet.
    in_flight: Mutex<HashMap<u64, PerfRecord>>,
    totals: Mutex<ReportTotals>,
    task_details: Mutex<HashMap<u32, String>>,
}

/// Thread safe registry of timed phases shared by every slice of a job.
///
/// Cloning is cheap and yields a handle to the same registry. A disabled trace keeps no state
/// and every operation on it is a no-op.
///
/// Locks are always taken in the order `pending`, `phases`, `in_flight`, `totals`,
/// `task_details`.
#[derive(Debug, Clone)]
pub struct PerfTrace {
    inner: Option<Arc<PerfTraceInner>>,
}

impl PerfTrace {
    pub fn new(job_id: u64, config: &PerfTraceConfig) -> Self {
        info!(job_id, enabled = config.enabled, "perf trace created");

        if !config.enabled {
            return Self::disabled();
        }

        let inner = PerfTraceInner {
            job_id,
            report_enabled: config.report_enabled,
            batch_size: config.batch_size.max(1),
            next_record_id: AtomicU64::new(0),
            pending: Mutex::new(Vec::new()),
            phases: Mutex::new(BTreeMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            totals: Mutex::new(ReportTotals::default()),
            task_details: Mutex::new(HashMap::new()),
        };

        Self {
            inner: Some(Arc::new(inner)),
        }
    }

    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Starts timing `phase` for a task.
    pub fn start_phase(&self, task_group_id: u32, task_id: u32, phase: Phase) -> PhaseHandle {
        let Some(inner) = &self.inner else {
            return PhaseHandle { trace: None };
        };

        let record = PerfRecord {
            id: inner.next_record_id.fetch_add(1, Ordering::Relaxed),
            task_group_id,
            task_id,
            phase,
            start: Instant::now(),
            elapsed_nanos: 0,
            count: 0,
            size: 0,
        };

        if inner.report_enabled && phase.is_reportable() {
            if let Ok(mut in_flight) = inner.in_flight.lock() {
                in_flight.insert(record.id, record.clone());
            }
        }

        PhaseHandle {
            trace: Some((inner.clone(), record)),
        }
    }

    /// Attaches a description to a task, shown next to it in the summary.
    ///
    /// The query part of URLs is dropped and descriptions added for the same task are joined
    /// with `,`.
    pub fn add_task_details(&self, task_id: u32, detail: &str) {
        let Some(inner) = &self.inner else {
            return;
        };

        let mut current = match detail.find('?') {
            Some(index) => detail[..index].to_string(),
            None => detail.to_string(),
        };
        if current.contains('[') && !current.contains(']') {
            current.push(']');
        }

        if let Ok(mut task_details) = inner.task_details.lock() {
            let entry = task_details.entry(task_id).or_default();
            let before = entry.trim();
            *entry = if before.is_empty() {
                current
            } else {
                format!("{before},{current}")
            };
        }
    }

    /// Renders the human readable summary. Never fails: internal errors are reported in the
    /// returned text.
    pub fn summarize(&self) -> String {
        let Some(inner) = &self.inner else {
            return PERF_TRACE_DISABLED.to_string();
        };

        match inner.summarize() {
            Ok(summary) => summary,
            Err(err) => format!("PerfTrace summarize has exception: {err}"),
        }
    }

    /// Takes a structured snapshot.
    pub fn report(&self, scope: ReportScope) -> PerfReport {
        let Some(inner) = &self.inner else {
            return PerfReport::default();
        };

        inner.report(scope).unwrap_or_else(|err| {
            debug!(error = %err, "perf trace report is incomplete");

            PerfReport {
                enabled: true,
                job_id: inner.job_id,
                ..PerfReport::default()
            }
        })
    }
}

impl PerfTraceInner {
    fn end(&self, mut record: PerfRecord, elapsed: Option<u64>) {
        record.elapsed_nanos =
            elapsed.unwrap_or_else(|| saturating_nanos(record.start.elapsed()));

        if self.report_enabled && record.phase.is_reportable() {
            if let (Ok(mut in_flight), Ok(mut totals)) = (self.in_flight.lock(), self.totals.lock())
            {
                in_flight.remove(&record.id);
                totals.add(record.phase, record.elapsed_nanos);
            }
        }

        let Ok(mut pending) = self.pending.lock() else {
            return;
        };
        pending.push(record);
        if pending.len() >= self.batch_size {
            if let Ok(mut phases) = self.phases.lock() {
                fold_pending(&mut pending, &mut phases);
            }
        }
    }

    fn flush_pending(&self) -> Result<MutexGuard<'_, BTreeMap<Phase, PhaseStats>>, PerfTraceError> {
        let mut pending = lock(&self.pending, "pending records")?;
        let mut phases = lock(&self.phases, "phase statistics")?;
        fold_pending(&mut pending, &mut phases);

        Ok(phases)
    }

    fn summarize(&self) -> Result<String, PerfTraceError> {
        let phases = self.flush_pending()?;
        let task_details = lock(&self.task_details, "task details")?;
        let detail = |task: Option<(u32, u32)>| {
            task.and_then(|(_, task_id)| task_details.get(&task_id))
                .map(String::as_str)
                .unwrap_or_default()
        };
        let task_ref = |task: Option<(u32, u32)>| match task {
            Some((task_group_id, task_id)) => format!("{}-{task_group_id}-{task_id}", self.job_id),
            None => String::new(),
        };

        let mut info = String::new();
        writeln!(info)?;
        writeln!(info, " === total summarize info === ")?;
        writeln!(info)?;
        writeln!(
            info,
            "   1. all phase average time info and max time task info: "
        )?;
        writeln!(info)?;
        writeln!(
            info,
            "{:<20} | {:>18} | {:>18} | {:>18} | {:>18} | {}",
            "PHASE",
            "AVERAGE USED TIME",
            "ALL TASK NUM",
            "MAX USED TIME",
            "MAX TASK ID",
            "MAX TASK INFO"
        )?;
        for (phase, stats) in phases.iter() {
            writeln!(
                info,
                "{:<20} | {:>18} | {:>18} | {:>18} | {:>18} | {}",
                phase,
                unit_time(stats.average_nanos()),
                stats.count,
                unit_time(stats.max_nanos),
                task_ref(stats.max_time_task),
                detail(stats.max_time_task)
            )?;
        }

        writeln!(info)?;
        writeln!(info)?;
        writeln!(info, " 2. record average count and max count task info :")?;
        writeln!(info)?;
        writeln!(
            info,
            "{:<20} | {:>18} | {:>18} | {:>18} | {:>18} | {:>18} | {}",
            "PHASE",
            "AVERAGE RECORDS",
            "AVERAGE BYTES",
            "MAX RECORDS",
            "MAX RECORD`S BYTES",
            "MAX TASK ID",
            "MAX TASK INFO"
        )?;
        if let Some(stats) = phases.get(&Phase::ReadTaskData) {
            if stats.max_records_task.is_some() {
                writeln!(
                    info,
                    "{:<20} | {:>18} | {:>18} | {:>18} | {:>18} | {:>18} | {}",
                    Phase::ReadTaskData,
                    stats.average_records(),
                    unit_size(stats.average_bytes()),
                    stats.max_records,
                    unit_size(stats.max_records_bytes),
                    task_ref(stats.max_records_task),
                    detail(stats.max_records_task)
                )?;
            }
        }

        Ok(info)
    }

    fn report(&self, scope: ReportScope) -> Result<PerfReport, PerfTraceError> {
        let phases = self.flush_pending()?.clone();
        let in_flight = lock(&self.in_flight, "in flight records")?;
        let mut totals = *lock(&self.totals, "report totals")?;

        if scope == ReportScope::IncludeInFlight {
            for record in in_flight.values() {
                totals.add(record.phase, saturating_nanos(record.start.elapsed()));
            }
        }

        Ok(PerfReport {
            enabled: true,
            job_id: self.job_id,
            phases,
            totals,
            in_flight: in_flight.len(),
        })
    }
}

/// Running measurement of one phase, returned by [`PerfTrace::start_phase`].
///
/// Dropping a handle without ending it leaves a reportable phase in flight.
#[derive(Debug)]
#[must_use = "a phase is only recorded once ended"]
pub struct PhaseHandle {
    trace: Option<(Arc<PerfTraceInner>, PerfRecord)>,
}

impl PhaseHandle {
    pub fn add_count(&mut self, count: u64) {
        if let Some((_, record)) = &mut self.trace {
            record.count += count;
        }
    }

    pub fn add_size(&mut self, size: u64) {
        if let Some((_, record)) = &mut self.trace {
            record.size += size;
        }
    }

    /// Ends the phase, measuring the time elapsed since it started.
    pub fn end(self) {
        if let Some((inner, record)) = self.trace {
            inner.end(record, None);
        }
    }

    /// Ends the phase with an externally measured duration, such as time accumulated while
    /// blocked on a channel.
    pub fn end_with(self, elapsed_nanos: u64) {
        if let Some((inner, record)) = self.trace {
            inner.end(record, Some(elapsed_nanos));
        }
    }
}

fn fold_pending(pending: &mut Vec<PerfRecord>, phases: &mut BTreeMap<Phase, PhaseStats>) {
    for record in pending.drain(..) {
        phases.entry(record.phase).or_default().add(&record);
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>, name: &'static str) -> Result<MutexGuard<'a, T>, PerfTraceError> {
    mutex.lock().map_err(|_| PerfTraceError::LockPoisoned(name))
}

fn saturating_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled(batch_size: usize) -> PerfTrace {
        PerfTrace::new(
            7,
            &PerfTraceConfig {
                enabled: true,
                report_enabled: true,
                batch_size,
            },
        )
    }

    #[test]
    fn disabled_trace_is_a_no_op() {
        let trace = PerfTrace::new(1, &PerfTraceConfig::default());
        assert!(!trace.is_enabled());

        let mut handle = trace.start_phase(0, 0, Phase::TaskTotal);
        handle.add_count(10);
        handle.end();
        trace.add_task_details(0, "jdbc:mysql://db/app");

        assert_eq!(trace.summarize(), PERF_TRACE_DISABLED);
        assert_eq!(trace.report(ReportScope::IncludeInFlight), PerfReport::default());
    }

    #[test]
    fn aggregates_ended_phases() {
        let trace = enabled(5000);

        trace.start_phase(0, 1, Phase::ReadTaskInit).end_with(1_000);
        trace.start_phase(0, 2, Phase::ReadTaskInit).end_with(3_000);
        trace.start_phase(1, 3, Phase::ReadTaskInit).end_with(2_000);

        let report = trace.report(ReportScope::Completed);
        let stats = &report.phases[&Phase::ReadTaskInit];
        assert_eq!(stats.count, 3);
        assert_eq!(stats.average_nanos(), 2_000);
        assert_eq!(stats.min_nanos, 1_000);
        assert_eq!(stats.max_nanos, 3_000);
        assert_eq!(stats.max_time_task, Some((0, 2)));
    }

    #[test]
    fn pending_records_fold_once_the_batch_is_full() {
        let trace = enabled(3);
        let inner = trace.inner.clone().unwrap();

        trace.start_phase(0, 0, Phase::WriteTaskPost).end_with(1);
        trace.start_phase(0, 1, Phase::WriteTaskPost).end_with(1);
        assert_eq!(inner.pending.lock().unwrap().len(), 2);
        assert!(inner.phases.lock().unwrap().is_empty());

        trace.start_phase(0, 2, Phase::WriteTaskPost).end_with(1);
        assert!(inner.pending.lock().unwrap().is_empty());
        assert_eq!(inner.phases.lock().unwrap()[&Phase::WriteTaskPost].count, 3);
    }

    #[test]
    fn reportable_totals_track_in_flight_records() {
        let trace = enabled(5000);

        let running = trace.start_phase(0, 0, Phase::TaskTotal);
        trace.start_phase(0, 1, Phase::SqlQuery).end_with(5 * NANOS_PER_MILLI);
        trace.start_phase(0, 1, Phase::ReadTaskData).end_with(9 * NANOS_PER_MILLI);
        std::thread::sleep(Duration::from_millis(5));

        let completed = trace.report(ReportScope::Completed);
        assert_eq!(completed.in_flight, 1);
        assert_eq!(completed.totals.sql_query_ms, 5);
        assert_eq!(completed.totals.task_total_ms, 0);

        let with_in_flight = trace.report(ReportScope::IncludeInFlight);
        assert!(with_in_flight.totals.task_total_ms >= 5);

        running.end_with(20 * NANOS_PER_MILLI);
        let completed = trace.report(ReportScope::Completed);
        assert_eq!(completed.in_flight, 0);
        assert_eq!(completed.totals.task_total_ms, 20);
    }

    #[test]
    fn summary_lists_phases_in_order_with_task_details() {
        let trace = enabled(5000);
        trace.add_task_details(3, "jdbc:mysql://db/app?useSSL=false");
        trace.add_task_details(3, "[users");

        let mut data = trace.start_phase(1, 3, Phase::ReadTaskData);
        data.add_count(1_000);
        data.add_size(2_500_000);
        data.end_with(1_500_000_000);
        trace.start_phase(1, 3, Phase::TaskTotal).end_with(2_000_000_000);

        let summary = trace.summarize();
        let total_line = summary.find("TASK_TOTAL").unwrap();
        let data_line = summary.find("READ_TASK_DATA").unwrap();
        assert!(total_line < data_line);
        assert!(summary.contains("1.500s"));
        assert!(summary.contains("2.000s"));
        assert!(summary.contains("7-1-3"));
        assert!(summary.contains("jdbc:mysql://db/app,[users]"));
        assert!(summary.contains("2.50M"));
        assert!(summary.contains(" 2. record average count and max count task info"));
    }

    #[test]
    fn concurrent_tasks_are_all_counted() {
        let trace = enabled(16);

        let threads: Vec<_> = (0..8)
            .map(|task_id| {
                let trace = trace.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let mut handle = trace.start_phase(0, task_id, Phase::WriteTaskData);
                        handle.add_count(2);
                        handle.end();
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        let report = trace.report(ReportScope::Completed);
        let stats = &report.phases[&Phase::WriteTaskData];
        assert_eq!(stats.count, 800);
        assert_eq!(stats.total_records, 1_600);
    }
}
