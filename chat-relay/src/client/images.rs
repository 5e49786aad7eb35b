//! Image attachments: data URI handling and upload before submission.

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine as _,
};
use tracing::{debug, warn};

use super::api::ChatApi;
use crate::error::ClientError;
use crate::types::{ImageAttachment, PreparedImage};

/// Filename used when an attachment has none.
pub const DEFAULT_IMAGE_NAME: &str = "image.png";

/// Media type of a data URI that declares none (RFC 2397).
const DEFAULT_MEDIA_TYPE: &str = "text/plain;charset=US-ASCII";

/// Standard alphabet, padding optional, as browsers accept it.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Binary payload of a data URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Decode `data:[<mediatype>][;base64],<data>`.
pub fn decode_data_uri(url: &str) -> Result<DecodedImage, ClientError> {
    let invalid = |reason: &str| {
        let prefix: String = url.chars().take(40).collect();
        ClientError::InvalidDataUri(format!("{reason}: {prefix}"))
    };

    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| invalid("missing data: scheme"))?;
    let (meta, data) = rest
        .split_once(',')
        .ok_or_else(|| invalid("missing ',' separator"))?;

    let (mime, is_base64) = match meta.strip_suffix(";base64") {
        Some(mime) => (mime, true),
        None => (meta, false),
    };
    let mime = if mime.is_empty() { DEFAULT_MEDIA_TYPE } else { mime };

    let bytes = if is_base64 {
        let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        LENIENT
            .decode(compact)
            .map_err(|e| invalid(&format!("bad base64 ({e})")))?
    } else {
        urlencoding::decode_binary(data.as_bytes()).into_owned()
    };

    Ok(DecodedImage {
        mime: mime.to_string(),
        bytes,
    })
}

/// Build a base64 data URI.
pub fn encode_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{mime};base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// Upload every embedded attachment, in order.
///
/// Remote references, undecodable URIs and failed uploads are skipped; none of
/// them abort the submission.
pub async fn prepare_images<A: ChatApi + ?Sized>(
    api: &A,
    project_id: &str,
    attachments: &[ImageAttachment],
) -> Vec<PreparedImage> {
    let mut prepared = Vec::with_capacity(attachments.len());

    for attachment in attachments {
        if !attachment.is_data_uri() {
            debug!("Skipping non-embedded image {}", attachment.url);
            continue;
        }

        let image = match decode_data_uri(&attachment.url) {
            Ok(image) => image,
            Err(e) => {
                warn!("Skipping image: {e}");
                continue;
            }
        };

        let filename = attachment.name.as_deref().unwrap_or(DEFAULT_IMAGE_NAME);
        match api.upload_image(project_id, image, filename).await {
            Ok(uploaded) => prepared.push(uploaded),
            Err(e) => warn!("Image upload failed for {filename}: {e}"),
        }
    }

    prepared
}
