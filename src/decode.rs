use crate::{RawResponse, ResponseData};

/// Negotiates how a response body is exposed to the caller.
///
/// Never fails: a body that cannot be decoded as JSON is returned as text.
pub(crate) fn decode_body(response: &RawResponse, parse_json: bool) -> ResponseData {
    if !parse_json {
        return ResponseData::Text(response.text());
    }

    if declares_json(response.content_type()) {
        return match response.json() {
            Ok(value) => ResponseData::Json(value),
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(error = %_err, "declared JSON body did not parse, keeping text");
                ResponseData::Text(response.text())
            }
        };
    }

    let text = response.text();
    match serde_json::from_str(&text) {
        Ok(value) => ResponseData::Json(value),
        Err(_) => ResponseData::Text(text),
    }
}

fn declares_json(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|value| {
        let value = value.to_ascii_lowercase();
        value.contains("application/json") || value.contains("+json")
    })
}
