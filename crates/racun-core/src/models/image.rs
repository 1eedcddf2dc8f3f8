/// Raw image bytes persisted under `(image_name, user_name)`.
///
/// Written on plain uploads and as a debug trail when QR decoding fails, so
/// the same image can be re-decoded later without re-uploading.
#[derive(Debug, Clone)]
pub struct StoredImage {
    /// Content hash of `bytes`
    pub image_name: String,
    pub user_name: String,
    pub bytes: Vec<u8>,
}

impl StoredImage {
    pub fn new(image_name: impl Into<String>, user_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            image_name: image_name.into(),
            user_name: user_name.into(),
            bytes,
        }
    }
}
