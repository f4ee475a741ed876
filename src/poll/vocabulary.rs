//! Status vocabularies for every stage the pipelines wait on.

/// Outcome of classifying one observed status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusCheck {
    /// The resource reached a terminal success status.
    Ready,
    /// The resource is still transitioning; query again.
    Pending,
    /// The resource reached a declared failure status.
    Failed,
    /// The status is not part of the vocabulary.
    Unexpected,
}

/// Transitional, success and failure status sets for one polled stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusVocabulary {
    /// Human-readable resource label used in logs and errors.
    pub resource: &'static str,
    /// Statuses that mean "not done yet".
    pub transitional: &'static [&'static str],
    /// Statuses that mean the stage completed.
    pub success: &'static [&'static str],
    /// Statuses that abort the pipeline.
    pub failure: &'static [&'static str],
}

impl StatusVocabulary {
    /// Classifies `status` against this vocabulary.
    ///
    /// Success is checked first so a status listed in more than one set
    /// resolves to the most permissive outcome.
    ///
    /// # Examples
    ///
    /// ```
    /// use vmvault::poll::{SNAPSHOT_CREATE, StatusCheck};
    ///
    /// assert_eq!(SNAPSHOT_CREATE.classify("creating"), StatusCheck::Pending);
    /// assert_eq!(SNAPSHOT_CREATE.classify("available"), StatusCheck::Ready);
    /// assert_eq!(SNAPSHOT_CREATE.classify("error"), StatusCheck::Failed);
    /// assert_eq!(SNAPSHOT_CREATE.classify("melted"), StatusCheck::Unexpected);
    /// ```
    #[must_use]
    pub fn classify(&self, status: &str) -> StatusCheck {
        if self.success.contains(&status) {
            StatusCheck::Ready
        } else if self.transitional.contains(&status) {
            StatusCheck::Pending
        } else if self.failure.contains(&status) {
            StatusCheck::Failed
        } else {
            StatusCheck::Unexpected
        }
    }
}

/// Snapshot taken from an attached volume.
pub const SNAPSHOT_CREATE: StatusVocabulary = StatusVocabulary {
    resource: "snapshot",
    transitional: &["creating"],
    success: &["available"],
    failure: &["error"],
};

/// Temporary volume materialised from a snapshot.
pub const TEMP_VOLUME_CREATE: StatusVocabulary = StatusVocabulary {
    resource: "temporary volume",
    transitional: &["creating", "downloading"],
    success: &["available"],
    failure: &["error"],
};

/// Backup taken from a temporary volume.
pub const BACKUP_CREATE: StatusVocabulary = StatusVocabulary {
    resource: "backup",
    transitional: &["creating"],
    success: &["available"],
    failure: &["error"],
};

/// Temporary volume that must settle before it can be deleted.
pub const VOLUME_RELEASE: StatusVocabulary = StatusVocabulary {
    resource: "temporary volume",
    transitional: &[
        "backing-up",
        "creating",
        "attaching",
        "detaching",
        "downloading",
    ],
    success: &["available"],
    failure: &["error", "error_backing-up"],
};

/// Snapshot that must settle before it can be deleted.
pub const SNAPSHOT_RELEASE: StatusVocabulary = StatusVocabulary {
    resource: "snapshot",
    transitional: &["creating", "backing-up"],
    success: &["available"],
    failure: &["error"],
};

/// Temporary volume after its delete request.
///
/// Only the failure set matters here: anything else means "still present".
pub const VOLUME_REMOVAL: StatusVocabulary = StatusVocabulary {
    resource: "temporary volume",
    transitional: &["deleting", "available"],
    success: &[],
    failure: &["error_deleting", "error"],
};

/// Backup about to be restored.
pub const BACKUP_RESTORABLE: StatusVocabulary = StatusVocabulary {
    resource: "backup",
    transitional: &["creating", "restoring"],
    success: &["available"],
    failure: &["error", "deleting", "error_deleting", "error_restoring"],
};

/// Volume being filled from a backup.
pub const RESTORED_VOLUME: StatusVocabulary = StatusVocabulary {
    resource: "restored volume",
    transitional: &["creating", "restoring-backup"],
    success: &["available"],
    failure: &["error", "error_restoring"],
};

/// Replacement server being built.
pub const SERVER_BUILD: StatusVocabulary = StatusVocabulary {
    resource: "server",
    transitional: &["BUILD"],
    success: &["ACTIVE"],
    failure: &["ERROR"],
};

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(SNAPSHOT_CREATE, "creating", StatusCheck::Pending)]
    #[case(SNAPSHOT_CREATE, "error", StatusCheck::Failed)]
    #[case(TEMP_VOLUME_CREATE, "downloading", StatusCheck::Pending)]
    #[case(VOLUME_RELEASE, "backing-up", StatusCheck::Pending)]
    #[case(VOLUME_RELEASE, "error_backing-up", StatusCheck::Failed)]
    #[case(BACKUP_RESTORABLE, "error_deleting", StatusCheck::Failed)]
    #[case(RESTORED_VOLUME, "restoring-backup", StatusCheck::Pending)]
    #[case(RESTORED_VOLUME, "error_restoring", StatusCheck::Failed)]
    #[case(SERVER_BUILD, "BUILD", StatusCheck::Pending)]
    #[case(SERVER_BUILD, "ACTIVE", StatusCheck::Ready)]
    #[case(SERVER_BUILD, "SHUTOFF", StatusCheck::Unexpected)]
    fn classifies_statuses(
        #[case] vocabulary: StatusVocabulary,
        #[case] status: &str,
        #[case] expected: StatusCheck,
    ) {
        assert_eq!(vocabulary.classify(status), expected);
    }

    #[test]
    fn status_matching_is_case_sensitive() {
        assert_eq!(SERVER_BUILD.classify("active"), StatusCheck::Unexpected);
    }
}
