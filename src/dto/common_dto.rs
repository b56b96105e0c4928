use serde::Serialize;

/// Envoltorio estándar de respuestas
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: Option<String>,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn success_with_message(data: T, message: String) -> Self {
        Self {
            success: true,
            message: Some(message),
            data: Some(data),
        }
    }
}

// Query `?cascade=true` del DELETE
#[derive(Debug, Default, serde::Deserialize)]
pub struct CascadeQuery {
    #[serde(default)]
    pub cascade: bool,
}
