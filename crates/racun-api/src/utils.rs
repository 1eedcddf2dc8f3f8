//! Common utilities for upload handlers.

use axum::extract::Multipart;
use racun_core::AppError;

/// Extract image bytes from a multipart form.
/// Exactly one field named "image" is accepted.
pub async fn extract_multipart_image(mut multipart: Multipart) -> Result<Vec<u8>, AppError> {
    let mut image_data: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("Failed to read multipart: {e}")))?
    {
        let field_name = field.name().map(|s| s.to_string()).unwrap_or_default();

        if field_name == "image" {
            if image_data.is_some() {
                return Err(AppError::InvalidInput(
                    "Multiple image fields are not allowed; send exactly one field named 'image'"
                        .to_string(),
                ));
            }
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::InvalidInput(format!("Failed to read image data: {e}")))?;
            image_data = Some(data.to_vec());
        }
    }

    image_data.ok_or_else(|| AppError::InvalidInput("No image provided".to_string()))
}

/// Validate image size against the configured limit.
pub fn validate_image_size(size: usize, max_size: usize) -> Result<(), AppError> {
    if size > max_size {
        return Err(AppError::PayloadTooLarge(format!(
            "Image exceeds maximum allowed size of {} MB",
            max_size / 1024 / 1024
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_within_limit_passes() {
        assert!(validate_image_size(1024, 2048).is_ok());
    }

    #[test]
    fn oversized_image_rejected() {
        let err = validate_image_size(3 * 1024 * 1024, 2 * 1024 * 1024).unwrap_err();
        assert!(matches!(err, AppError::PayloadTooLarge(_)));
    }
}
