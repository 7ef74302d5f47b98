/// A snapshot of how far an upload batch has gone.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UploadProgress {
    /// Bytes handed to the transport so far, across every file in the batch.
    pub bytes_completed: u64,

    /// Total bytes in the batch.
    pub total_bytes: u64,

    /// Bytes added since the previous report.
    pub bytes_completion_increment: u64,
}

impl UploadProgress {
    /// `floor(bytes_completed * 100 / total_bytes)`, clamped to 100.  An empty batch is complete.
    pub fn percent(&self) -> u8 {
        if self.total_bytes == 0 {
            return 100;
        }
        let pct = (self.bytes_completed as u128 * 100) / self.total_bytes as u128;
        pct.min(100) as u8
    }

    pub fn is_complete(&self) -> bool {
        self.bytes_completed >= self.total_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_floors() {
        let p = UploadProgress {
            bytes_completed: 2,
            total_bytes: 3,
            bytes_completion_increment: 2,
        };
        assert_eq!(p.percent(), 66);
        assert!(!p.is_complete());

        let p = UploadProgress {
            bytes_completed: 7,
            total_bytes: 7,
            bytes_completion_increment: 1,
        };
        assert_eq!(p.percent(), 100);
        assert!(p.is_complete());
    }

    #[test]
    fn test_empty_batch_is_complete() {
        assert_eq!(UploadProgress::default().percent(), 100);
    }

    #[test]
    fn test_large_totals_do_not_overflow() {
        let p = UploadProgress {
            bytes_completed: u64::MAX / 2,
            total_bytes: u64::MAX,
            bytes_completion_increment: 0,
        };
        assert_eq!(p.percent(), 49);
    }
}
