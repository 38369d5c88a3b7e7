use std::io;

use thiserror::Error;

use crate::services::ImsOperation;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("{operation} failed: issue {issue_id} not found")]
    IssueNotFound {
        operation: ImsOperation,
        issue_id: String,
    },
    #[error(
        "{}no tracker equivalent for {kind} '{value}' in the mapping configuration",
        operation_prefix(.operation, .issue_id)
    )]
    UnmappedValue {
        operation: Option<ImsOperation>,
        issue_id: Option<String>,
        kind: &'static str,
        value: String,
    },
    #[error("{operation} failed{}: tracker unreachable: {detail}", issue_suffix(.issue_id))]
    TrackerUnreachable {
        operation: ImsOperation,
        issue_id: Option<String>,
        detail: String,
    },
    #[error("{operation} failed{}: tracker rejected the request: {detail}", issue_suffix(.issue_id))]
    TrackerRejected {
        operation: ImsOperation,
        issue_id: Option<String>,
        detail: String,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl AppError {
    pub fn unmapped(kind: &'static str, value: impl ToString) -> Self {
        AppError::UnmappedValue {
            operation: None,
            issue_id: None,
            kind,
            value: value.to_string(),
        }
    }

    /// Attaches the connector operation and issue to an error raised by the
    /// mapping layer. Errors that already carry them are left alone.
    pub fn within(self, operation: ImsOperation, issue_id: Option<&str>) -> Self {
        match self {
            AppError::UnmappedValue {
                operation: None,
                issue_id: None,
                kind,
                value,
            } => AppError::UnmappedValue {
                operation: Some(operation),
                issue_id: issue_id.map(str::to_string),
                kind,
                value,
            },
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::IssueNotFound { .. })
    }
}

fn issue_suffix(issue_id: &Option<String>) -> String {
    issue_id
        .as_deref()
        .map(|id| format!(" for issue {id}"))
        .unwrap_or_default()
}

fn operation_prefix(operation: &Option<ImsOperation>, issue_id: &Option<String>) -> String {
    operation
        .map(|operation| format!("{operation} failed{}: ", issue_suffix(issue_id)))
        .unwrap_or_default()
}

pub type AppResult<T> = Result<T, AppError>;

pub trait OperationContext<T> {
    fn within(self, operation: ImsOperation, issue_id: Option<&str>) -> AppResult<T>;
}

impl<T> OperationContext<T> for AppResult<T> {
    fn within(self, operation: ImsOperation, issue_id: Option<&str>) -> AppResult<T> {
        self.map_err(|err| err.within(operation, issue_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_errors_name_operation_and_issue() {
        let err = AppError::TrackerRejected {
            operation: ImsOperation::ChangeState,
            issue_id: Some("SG-4".to_string()),
            detail: "no transition to 'Done'".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "change_state failed for issue SG-4: tracker rejected the request: no transition to 'Done'"
        );
    }

    #[test]
    fn tracker_errors_without_issue_omit_suffix() {
        let err = AppError::TrackerUnreachable {
            operation: ImsOperation::ListIssues,
            issue_id: None,
            detail: "connection refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "list_issues failed: tracker unreachable: connection refused"
        );
    }

    #[test]
    fn unmapped_values_name_operation_and_issue_once_attached() {
        let bare = AppError::unmapped("estimation", "XXL");
        assert_eq!(
            bare.to_string(),
            "no tracker equivalent for estimation 'XXL' in the mapping configuration"
        );

        let err = bare.within(ImsOperation::ChangeEstimation, Some("SG-1"));
        assert_eq!(
            err.to_string(),
            "change_estimation failed for issue SG-1: no tracker equivalent for estimation 'XXL' in the mapping configuration"
        );

        let kept = err.within(ImsOperation::FindIssue, None);
        assert!(matches!(
            kept,
            AppError::UnmappedValue {
                operation: Some(ImsOperation::ChangeEstimation),
                ..
            }
        ));
    }

    #[test]
    fn result_context_leaves_other_errors_alone() {
        let result: AppResult<()> = Err(AppError::Configuration("missing".to_string()));
        let err = result
            .within(ImsOperation::CreateIssue, None)
            .unwrap_err();
        assert_eq!(err.to_string(), "configuration error: missing");
    }
}
