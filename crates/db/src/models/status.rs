//! Status helper enums mapping to SMALLSERIAL/SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding `*_statuses` database table.

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }
    };
}

define_status_enum! {
    /// Batch lookup job lifecycle status. Monotonic: a job only ever
    /// moves forward through `Pending -> Processing -> {Completed, Failed}`.
    JobStatus {
        Pending = 1,
        Processing = 2,
        Completed = 3,
        Failed = 4,
    }
}

impl JobStatus {
    /// Terminal statuses never change again (other than job removal).
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Wire name as exposed by the status endpoint.
    pub fn name(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Reverse lookup from a database status ID.
    pub fn from_id(id: StatusId) -> Option<Self> {
        match id {
            1 => Some(JobStatus::Pending),
            2 => Some(JobStatus::Processing),
            3 => Some(JobStatus::Completed),
            4 => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

define_status_enum! {
    /// Per-serial lookup outcome.
    ResultStatus {
        Success = 1,
        Error = 2,
        NotFound = 3,
        Filtered = 4,
    }
}

impl ResultStatus {
    /// Reverse lookup from a database status ID.
    pub fn from_id(id: StatusId) -> Option<Self> {
        match id {
            1 => Some(ResultStatus::Success),
            2 => Some(ResultStatus::Error),
            3 => Some(ResultStatus::NotFound),
            4 => Some(ResultStatus::Filtered),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ResultStatus::Success => "success",
            ResultStatus::Error => "error",
            ResultStatus::NotFound => "not_found",
            ResultStatus::Filtered => "filtered",
        }
    }
}

define_status_enum! {
    /// Human assignment workflow on a completed job. Strictly forward-only.
    WorkflowStatus {
        Unassigned = 1,
        Assigned = 2,
        Downloaded = 3,
        Working = 4,
        Finished = 5,
    }
}

impl WorkflowStatus {
    /// Reverse lookup from a database status ID.
    pub fn from_id(id: StatusId) -> Option<Self> {
        match id {
            1 => Some(WorkflowStatus::Unassigned),
            2 => Some(WorkflowStatus::Assigned),
            3 => Some(WorkflowStatus::Downloaded),
            4 => Some(WorkflowStatus::Working),
            5 => Some(WorkflowStatus::Finished),
            _ => None,
        }
    }

    /// The immediate successor state, or `None` from `Finished`.
    pub fn next(self) -> Option<Self> {
        match self {
            WorkflowStatus::Unassigned => Some(WorkflowStatus::Assigned),
            WorkflowStatus::Assigned => Some(WorkflowStatus::Downloaded),
            WorkflowStatus::Downloaded => Some(WorkflowStatus::Working),
            WorkflowStatus::Working => Some(WorkflowStatus::Finished),
            WorkflowStatus::Finished => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            WorkflowStatus::Unassigned => "unassigned",
            WorkflowStatus::Assigned => "assigned",
            WorkflowStatus::Downloaded => "downloaded",
            WorkflowStatus::Working => "working",
            WorkflowStatus::Finished => "finished",
        }
    }

    /// Parse a wire name from the workflow PATCH endpoint.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "unassigned" => Some(WorkflowStatus::Unassigned),
            "assigned" => Some(WorkflowStatus::Assigned),
            "downloaded" => Some(WorkflowStatus::Downloaded),
            "working" => Some(WorkflowStatus::Working),
            "finished" => Some(WorkflowStatus::Finished),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_ids_match_seed_data() {
        assert_eq!(JobStatus::Pending.id(), 1);
        assert_eq!(JobStatus::Processing.id(), 2);
        assert_eq!(JobStatus::Completed.id(), 3);
        assert_eq!(JobStatus::Failed.id(), 4);
    }

    #[test]
    fn result_status_ids_match_seed_data() {
        assert_eq!(ResultStatus::Success.id(), 1);
        assert_eq!(ResultStatus::Error.id(), 2);
        assert_eq!(ResultStatus::NotFound.id(), 3);
        assert_eq!(ResultStatus::Filtered.id(), 4);
    }

    #[test]
    fn workflow_status_ids_match_seed_data() {
        assert_eq!(WorkflowStatus::Unassigned.id(), 1);
        assert_eq!(WorkflowStatus::Assigned.id(), 2);
        assert_eq!(WorkflowStatus::Downloaded.id(), 3);
        assert_eq!(WorkflowStatus::Working.id(), 4);
        assert_eq!(WorkflowStatus::Finished.id(), 5);
    }

    #[test]
    fn workflow_order_is_strictly_forward() {
        assert_eq!(
            WorkflowStatus::Unassigned.next(),
            Some(WorkflowStatus::Assigned)
        );
        assert_eq!(
            WorkflowStatus::Assigned.next(),
            Some(WorkflowStatus::Downloaded)
        );
        assert_eq!(
            WorkflowStatus::Downloaded.next(),
            Some(WorkflowStatus::Working)
        );
        assert_eq!(
            WorkflowStatus::Working.next(),
            Some(WorkflowStatus::Finished)
        );
        assert_eq!(WorkflowStatus::Finished.next(), None);
    }

    #[test]
    fn terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn job_status_round_trips_through_id() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::from_id(status.id()), Some(status));
        }
        assert_eq!(JobStatus::from_id(99), None);
    }

    #[test]
    fn workflow_parse_accepts_wire_names() {
        assert_eq!(
            WorkflowStatus::parse("downloaded"),
            Some(WorkflowStatus::Downloaded)
        );
        assert_eq!(WorkflowStatus::parse("bogus"), None);
    }
}
