use std::fmt;

/// Timed steps of a slice's life, and of notable operations inside readers and writers.
///
/// Phases are ordered by their numeric id, which is also the order of the summary table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    TaskTotal,
    ReadTaskInit,
    ReadTaskPrepare,
    ReadTaskData,
    ReadTaskPost,
    ReadTaskDestroy,
    WriteTaskInit,
    WriteTaskPrepare,
    WriteTaskData,
    WriteTaskPost,
    WriteTaskDestroy,
    SqlQuery,
    ResultNextAll,
    OdpsBlockClose,
    WaitReadTime,
    WaitWriteTime,
    TransformerTime,
}

impl Phase {
    pub const ALL: [Phase; 17] = [
        Phase::TaskTotal,
        Phase::ReadTaskInit,
        Phase::ReadTaskPrepare,
        Phase::ReadTaskData,
        Phase::ReadTaskPost,
        Phase::ReadTaskDestroy,
        Phase::WriteTaskInit,
        Phase::WriteTaskPrepare,
        Phase::WriteTaskData,
        Phase::WriteTaskPost,
        Phase::WriteTaskDestroy,
        Phase::SqlQuery,
        Phase::ResultNextAll,
        Phase::OdpsBlockClose,
        Phase::WaitReadTime,
        Phase::WaitWriteTime,
        Phase::TransformerTime,
    ];

    pub fn id(&self) -> u32 {
        match self {
            Phase::TaskTotal => 0,
            Phase::ReadTaskInit => 1,
            Phase::ReadTaskPrepare => 2,
            Phase::ReadTaskData => 3,
            Phase::ReadTaskPost => 4,
            Phase::ReadTaskDestroy => 5,
            Phase::WriteTaskInit => 6,
            Phase::WriteTaskPrepare => 7,
            Phase::WriteTaskData => 8,
            Phase::WriteTaskPost => 9,
            Phase::WriteTaskDestroy => 10,
            Phase::SqlQuery => 100,
            Phase::ResultNextAll => 101,
            Phase::OdpsBlockClose => 102,
            Phase::WaitReadTime => 103,
            Phase::WaitWriteTime => 104,
            Phase::TransformerTime => 201,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Phase::TaskTotal => "TASK_TOTAL",
            Phase::ReadTaskInit => "READ_TASK_INIT",
            Phase::ReadTaskPrepare => "READ_TASK_PREPARE",
            Phase::ReadTaskData => "READ_TASK_DATA",
            Phase::ReadTaskPost => "READ_TASK_POST",
            Phase::ReadTaskDestroy => "READ_TASK_DESTROY",
            Phase::WriteTaskInit => "WRITE_TASK_INIT",
            Phase::WriteTaskPrepare => "WRITE_TASK_PREPARE",
            Phase::WriteTaskData => "WRITE_TASK_DATA",
            Phase::WriteTaskPost => "WRITE_TASK_POST",
            Phase::WriteTaskDestroy => "WRITE_TASK_DESTROY",
            Phase::SqlQuery => "SQL_QUERY",
            Phase::ResultNextAll => "RESULT_NEXT_ALL",
            Phase::OdpsBlockClose => "ODPS_BLOCK_CLOSE",
            Phase::WaitReadTime => "WAIT_READ_TIME",
            Phase::WaitWriteTime => "WAIT_WRITE_TIME",
            Phase::TransformerTime => "TRANSFORMER_TIME",
        }
    }

    /// Phases whose running totals are kept for reporting, including records still in flight.
    pub fn is_reportable(&self) -> bool {
        matches!(
            self,
            Phase::TaskTotal | Phase::SqlQuery | Phase::ResultNextAll | Phase::OdpsBlockClose
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `pad` so that width and alignment flags apply in the summary table.
        f.pad(self.name())
    }
}
