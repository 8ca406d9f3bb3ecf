//! Status helper enums mapping to SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data in the
//! corresponding `*_statuses` database table.

use sieve_core::job::JobStatus;

/// Status ID type matching SMALLINT in the database.
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

            /// Look up a variant by database status ID.
            pub fn from_id(id: StatusId) -> Option<Self> {
                $(
                    if id == $val {
                        return Some($name::$variant);
                    }
                )+
                None
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
    /// Job lifecycle status (`job_statuses`).
    DbJobStatus {
        Pending = 1,
        Running = 2,
        Progress = 3,
        Succeeded = 4,
        Failed = 5,
    }
}

impl From<JobStatus> for DbJobStatus {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Pending => DbJobStatus::Pending,
            JobStatus::Running => DbJobStatus::Running,
            JobStatus::Progress => DbJobStatus::Progress,
            JobStatus::Succeeded => DbJobStatus::Succeeded,
            JobStatus::Failed => DbJobStatus::Failed,
        }
    }
}

impl From<DbJobStatus> for JobStatus {
    fn from(status: DbJobStatus) -> Self {
        match status {
            DbJobStatus::Pending => JobStatus::Pending,
            DbJobStatus::Running => JobStatus::Running,
            DbJobStatus::Progress => JobStatus::Progress,
            DbJobStatus::Succeeded => JobStatus::Succeeded,
            DbJobStatus::Failed => JobStatus::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip() {
        for id in 1..=5 {
            let status = DbJobStatus::from_id(id).unwrap();
            assert_eq!(status.id(), id);
            assert_eq!(DbJobStatus::from(JobStatus::from(status)), status);
        }
        assert_eq!(DbJobStatus::from_id(0), None);
        assert_eq!(DbJobStatus::from_id(6), None);
    }
}
