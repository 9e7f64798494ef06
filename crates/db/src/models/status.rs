//! Status helper enums mapping to SMALLSERIAL/SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding `*_statuses` database table. `QueuePriority` has no
//! lookup table; it is an ordering key stored as a plain SMALLINT.

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
    /// Import queue item lifecycle status.
    QueueStatus {
        Pending = 1,
        Processing = 2,
        Completed = 3,
        Failed = 4,
        Retrying = 5,
    }
}

define_status_enum! {
    /// File integrity check status.
    HealthStatus {
        Pending = 1,
        Checking = 2,
        Healthy = 3,
        Partial = 4,
        Corrupted = 5,
        RepairTriggered = 6,
    }
}

define_status_enum! {
    /// Claim ordering priority for import queue items.
    QueuePriority {
        Low = 1,
        Normal = 2,
        High = 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_status_ids_match_seed_data() {
        assert_eq!(QueueStatus::Pending.id(), 1);
        assert_eq!(QueueStatus::Processing.id(), 2);
        assert_eq!(QueueStatus::Completed.id(), 3);
        assert_eq!(QueueStatus::Failed.id(), 4);
        assert_eq!(QueueStatus::Retrying.id(), 5);
    }

    #[test]
    fn health_status_ids_match_seed_data() {
        assert_eq!(HealthStatus::Pending.id(), 1);
        assert_eq!(HealthStatus::Checking.id(), 2);
        assert_eq!(HealthStatus::Healthy.id(), 3);
        assert_eq!(HealthStatus::Partial.id(), 4);
        assert_eq!(HealthStatus::Corrupted.id(), 5);
        assert_eq!(HealthStatus::RepairTriggered.id(), 6);
    }

    #[test]
    fn priority_orders_low_to_high() {
        assert!(QueuePriority::Low.id() < QueuePriority::Normal.id());
        assert!(QueuePriority::Normal.id() < QueuePriority::High.id());
    }

    #[test]
    fn status_into_status_id() {
        let id: StatusId = QueueStatus::Pending.into();
        assert_eq!(id, 1);
    }
}
