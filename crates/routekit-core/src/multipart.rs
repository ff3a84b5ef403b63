//! `multipart/form-data` parsing and uploaded files
//!
//! The driver parses multipart bodies once; files land in the request
//! context and plain fields are merged into the parsed body, so `BodyParam`
//! parameters read them like JSON fields.

use crate::error::{HttpError, Result};
use bytes::Bytes;
use routekit_validate::{FieldError, ValidationError};
use std::path::Path;

/// Maximum number of parts accepted in one form
pub const DEFAULT_MAX_PARTS: usize = 100;

/// A file received in a multipart form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    field: String,
    file_name: Option<String>,
    content_type: Option<String>,
    data: Bytes,
}

impl UploadedFile {
    pub fn new(
        field: impl Into<String>,
        file_name: Option<String>,
        content_type: Option<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            field: field.into(),
            file_name,
            content_type,
            data: data.into(),
        }
    }

    /// Form field the file was sent under
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Original file name, as sent by the client
    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn bytes(&self) -> &Bytes {
        &self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.data.to_vec())
            .map_err(|e| HttpError::bad_request(format!("Invalid UTF-8 in file: {}", e)))
    }

    /// Write the file into `dir`, under `filename` or its sanitized original name.
    pub async fn save_to(&self, dir: impl AsRef<Path>, filename: Option<&str>) -> Result<String> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            HttpError::internal("Failed to create upload directory").with_internal(e.to_string())
        })?;

        let name = filename
            .or(self.file_name.as_deref())
            .ok_or_else(|| HttpError::bad_request("Uploaded file has no file name"))?;
        let path = dir.join(sanitize_filename(name));

        tokio::fs::write(&path, &self.data).await.map_err(|e| {
            HttpError::internal("Failed to save uploaded file").with_internal(e.to_string())
        })?;
        Ok(path.to_string_lossy().into_owned())
    }
}

fn sanitize_filename(filename: &str) -> String {
    filename
        .replace(['/', '\\'], "_")
        .replace("..", "_")
        .trim_start_matches('.')
        .to_string()
}

/// Restrictions checked when an upload parameter is resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadOptions {
    /// Maximum size of each file in bytes
    pub max_file_size: Option<usize>,
    /// Accepted content types; `image/*` style wildcards are allowed. Empty accepts all.
    pub allowed_content_types: Vec<String>,
    /// Maximum number of files for `UploadedFiles`
    pub max_files: Option<usize>,
}

impl UploadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_file_size(mut self, bytes: usize) -> Self {
        self.max_file_size = Some(bytes);
        self
    }

    pub fn allow_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.allowed_content_types.push(content_type.into());
        self
    }

    pub fn max_files(mut self, count: usize) -> Self {
        self.max_files = Some(count);
        self
    }

    fn accepts(&self, content_type: Option<&str>) -> bool {
        if self.allowed_content_types.is_empty() {
            return true;
        }
        let Some(content_type) = content_type else {
            return false;
        };
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        self.allowed_content_types.iter().any(|allowed| {
            let allowed = allowed.to_ascii_lowercase();
            match allowed.strip_suffix("/*") {
                Some(major) => essence
                    .split_once('/')
                    .map(|(m, _)| m == major)
                    .unwrap_or(false),
                None => allowed == essence,
            }
        })
    }

    /// Violations of these options, with field paths relative to the parameter
    /// (`""` for the list, `"[i]"` for one file of a list, `""` for a single file).
    pub fn check(&self, files: &[UploadedFile], single: bool) -> std::result::Result<(), ValidationError> {
        let mut errors = ValidationError::new(Vec::new());

        if let Some(max) = self.max_files {
            if files.len() > max {
                errors.add(
                    FieldError::new("", "max_files", format!("At most {} files are accepted", max))
                        .with_param("max", max),
                );
            }
        }

        for (index, file) in files.iter().enumerate() {
            let path = if single {
                String::new()
            } else {
                format!("[{}]", index)
            };
            if let Some(max) = self.max_file_size {
                if file.size() > max {
                    errors.add(
                        FieldError::new(
                            path.clone(),
                            "file_size",
                            format!("File exceeds the maximum size of {} bytes", max),
                        )
                        .with_param("max", max)
                        .with_param("actual", file.size()),
                    );
                }
            }
            if !self.accepts(file.content_type()) {
                errors.add(FieldError::new(
                    path,
                    "content_type",
                    format!(
                        "Content type {} is not accepted",
                        file.content_type().unwrap_or("(none)")
                    ),
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Parsed `multipart/form-data` body.
#[derive(Debug, Clone, Default)]
pub struct MultipartForm {
    pub files: Vec<UploadedFile>,
    /// Non-file fields, in order
    pub fields: Vec<(String, String)>,
}

/// Boundary parameter of a `multipart/form-data` content type.
pub fn boundary(content_type: &str) -> Option<&str> {
    let (essence, params) = content_type.split_once(';')?;
    if !essence.trim().eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }
    params.split(';').find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("boundary")
            .then(|| value.trim().trim_matches('"'))
            .filter(|b| !b.is_empty())
    })
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

/// Parse a multipart body. File data is kept byte for byte.
pub fn parse(body: &Bytes, boundary: &str) -> Result<MultipartForm> {
    let malformed = || HttpError::bad_request("Malformed multipart body");
    let delimiter = format!("--{}", boundary).into_bytes();
    let separator = [b"\r\n".as_slice(), &delimiter].concat();

    let mut form = MultipartForm::default();
    let mut cursor = find(body, &delimiter, 0).ok_or_else(malformed)? + delimiter.len();
    let mut parts = 0;

    loop {
        if body[cursor..].starts_with(b"--") {
            break;
        }
        if !body[cursor..].starts_with(b"\r\n") {
            return Err(malformed());
        }
        let start = cursor + 2;
        let end = find(body, &separator, start).ok_or_else(malformed)?;

        parts += 1;
        if parts > DEFAULT_MAX_PARTS {
            return Err(HttpError::bad_request(format!(
                "Multipart form has more than {} parts",
                DEFAULT_MAX_PARTS
            )));
        }

        let part = &body[start..end];
        let split = find(part, b"\r\n\r\n", 0).ok_or_else(malformed)?;
        let headers = String::from_utf8_lossy(&part[..split]);
        let data = body.slice(start + split + 4..end);

        let mut name = None;
        let mut file_name = None;
        let mut content_type = None;
        for line in headers.split("\r\n") {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            if key.trim().eq_ignore_ascii_case("content-disposition") {
                for param in value.split(';').skip(1) {
                    if let Some((k, v)) = param.split_once('=') {
                        let v = v.trim().trim_matches('"').to_string();
                        match k.trim() {
                            "name" => name = Some(v),
                            "filename" => file_name = Some(v),
                            _ => {}
                        }
                    }
                }
            } else if key.trim().eq_ignore_ascii_case("content-type") {
                content_type = Some(value.to_string());
            }
        }

        let name = name.ok_or_else(|| HttpError::bad_request("Multipart part without a name"))?;
        if file_name.is_some() {
            form.files
                .push(UploadedFile::new(name, file_name, content_type, data));
        } else {
            let text = String::from_utf8(data.to_vec()).map_err(|e| {
                HttpError::bad_request(format!("Invalid UTF-8 in field '{}': {}", name, e))
            })?;
            form.fields.push((name, text));
        }

        cursor = end + separator.len();
    }

    Ok(form)
}
