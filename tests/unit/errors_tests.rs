/*!
 * Tests for the error taxonomy
 */

use std::path::PathBuf;
use textwai::errors::{AppError, PipelineError, ProviderError};

#[test]
fn test_is_retryable_withTransportErrors_shouldReturnTrue() {
    assert!(ProviderError::Timeout("t".to_string()).is_retryable());
    assert!(ProviderError::ConnectionRefused("c".to_string()).is_retryable());
    assert!(ProviderError::MalformedResponse("m".to_string()).is_retryable());
    assert!(ProviderError::RequestFailed("r".to_string()).is_retryable());
}

#[test]
fn test_is_retryable_withApiErrors_shouldDependOnStatus() {
    let api = |status_code| ProviderError::ApiError { status_code, message: String::new() };

    assert!(api(429).is_retryable());
    assert!(api(500).is_retryable());
    assert!(api(503).is_retryable());
    assert!(!api(400).is_retryable());
    assert!(!api(401).is_retryable());
}

#[test]
fn test_is_retryable_withMissingModel_shouldReturnFalse() {
    assert!(!ProviderError::ModelNotFound("mistral".to_string()).is_retryable());
}

#[test]
fn test_display_shouldIncludeDetails() {
    let error = ProviderError::ApiError { status_code: 502, message: "bad gateway".to_string() };
    assert_eq!(error.to_string(), "API responded with error: 502 - bad gateway");

    let error = PipelineError::config("overlap too large");
    assert_eq!(error.to_string(), "Configuration error: overlap too large");
}

#[test]
fn test_persistence_error_shouldExposeSource() {
    let error = PipelineError::Persistence {
        path: PathBuf::from("/out/a.txt"),
        source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
    };

    let source = std::error::Error::source(&error).map(|s| s.to_string());
    assert_eq!(source.as_deref(), Some("denied"));
    assert!(error.to_string().contains("a.txt"));
}

#[test]
fn test_conversions_shouldWrapInnerErrors() {
    let pipeline: PipelineError = ProviderError::Timeout("slow".to_string()).into();
    assert!(matches!(pipeline, PipelineError::Provider(ProviderError::Timeout(_))));

    let app: AppError = pipeline.into();
    assert!(matches!(app, AppError::Pipeline(_)));

    let app: AppError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
    assert!(matches!(app, AppError::File(_)));

    let app: AppError = anyhow::anyhow!("boom").into();
    assert_eq!(app.to_string(), "Unknown error: boom");
}
