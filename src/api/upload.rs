use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse};
use futures::TryStreamExt;
use serde_json::json;

use super::{origin, ApiState};
use crate::{
    auth::Viewer,
    error::{Error, Result},
    storage::DEFAULT_CATEGORY,
};

struct ImagePart {
    filename: String,
    bytes: Vec<u8>,
}

/// Drains one field, refusing to buffer more than `limit` bytes.
async fn read_field(field: &mut actix_multipart::Field, limit: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    while let Some(chunk) = field.try_next().await? {
        if buf.len() + chunk.len() > limit {
            return Err(Error::Invalid(format!(
                "image: File too large. The limit is {limit} bytes."
            )));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

/// Multipart fields `image` (the file) and `category` (text, optional).
#[actix_web::post("/api/upload-image/")]
pub(super) async fn upload_image(
    req: HttpRequest,
    data: web::Data<ApiState>,
    viewer: Viewer,
    mut payload: Multipart,
) -> Result<HttpResponse> {
    let user = viewer.require_user()?;
    let limit = data.media.max_bytes();

    let mut image = None;
    let mut category = None;
    while let Some(mut field) = payload.try_next().await? {
        let disposition = field.content_disposition();
        let name = disposition.get_name().unwrap_or_default().to_string();
        let filename = disposition.get_filename().map(str::to_string);
        match (name.as_str(), filename) {
            ("image", Some(filename)) => {
                let bytes = read_field(&mut field, limit).await?;
                image = Some(ImagePart { filename, bytes });
            }
            ("category", _) => {
                let raw = read_field(&mut field, 256).await?;
                let text = String::from_utf8(raw)
                    .map_err(|_| Error::invalid("category: Not valid UTF-8."))?;
                category = Some(text.trim().to_string()).filter(|c| !c.is_empty());
            }
            _ => {
                // unknown parts still have to be consumed
                read_field(&mut field, limit).await?;
            }
        }
    }

    let Some(image) = image else {
        return Err(Error::invalid("No image file provided"));
    };
    let category = category.as_deref().unwrap_or(DEFAULT_CATEGORY);
    let file_path = data.media.save(category, &image.filename, &image.bytes).await?;
    tracing::info!("{} uploaded {file_path}", user.username);

    let image_url = format!("{}{}", origin(&req), data.media.url_path(&file_path));
    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "image_url": image_url,
        "file_path": file_path,
    })))
}
