// Path: crates/mandate-issuer/src/codec.rs

//! Wire encoding: `base64url(header) "." base64url(payload) "." base64url(signature)`.
//! The signature covers the two segments exactly as they appear on the
//! wire, not a re-serialization of the decoded structs, so verification
//! never depends on `serde_json`'s output being byte-identical across a
//! decode/re-encode round trip.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::Serialize;

use mandate_types::error::{FatalError, Result};
use mandate_types::mandate::{MandateHeader, MandateToken, MandateVerifyError, SignedMandate};

pub struct DecodedMandate {
    pub signed: SignedMandate,
    pub header_segment: String,
    pub payload_segment: String,
}

pub fn encode_segment<T: Serialize>(value: &T) -> Result<String> {
    let bytes = serde_json::to_vec(value).map_err(|e| FatalError::SerializationFailure(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

pub fn signing_bytes(header_segment: &str, payload_segment: &str) -> Vec<u8> {
    format!("{header_segment}.{payload_segment}").into_bytes()
}

pub fn encode(signed: &SignedMandate) -> Result<String> {
    let header_segment = encode_segment(&signed.header)?;
    let payload_segment = encode_segment(&signed.payload)?;
    let signature_segment = URL_SAFE_NO_PAD.encode(&signed.signature);
    Ok(format!("{header_segment}.{payload_segment}.{signature_segment}"))
}

pub fn decode(wire: &str) -> std::result::Result<DecodedMandate, MandateVerifyError> {
    let mut parts = wire.split('.');
    let header_segment = parts.next().ok_or(MandateVerifyError::MalformedStructure)?;
    let payload_segment = parts.next().ok_or(MandateVerifyError::MalformedStructure)?;
    let signature_segment = parts.next().ok_or(MandateVerifyError::MalformedStructure)?;
    if parts.next().is_some() {
        return Err(MandateVerifyError::MalformedStructure);
    }

    let header_bytes = URL_SAFE_NO_PAD
        .decode(header_segment)
        .map_err(|_| MandateVerifyError::MalformedStructure)?;
    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload_segment)
        .map_err(|_| MandateVerifyError::MalformedStructure)?;
    let signature = URL_SAFE_NO_PAD
        .decode(signature_segment)
        .map_err(|_| MandateVerifyError::MalformedStructure)?;

    let header: MandateHeader =
        serde_json::from_slice(&header_bytes).map_err(|_| MandateVerifyError::MalformedStructure)?;
    let payload: MandateToken =
        serde_json::from_slice(&payload_bytes).map_err(|_| MandateVerifyError::MalformedStructure)?;

    Ok(DecodedMandate {
        signed: SignedMandate { header, payload, signature },
        header_segment: header_segment.to_string(),
        payload_segment: payload_segment.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_rejects_wrong_part_count() {
        assert!(matches!(decode("onlyonepart"), Err(MandateVerifyError::MalformedStructure)));
        assert!(matches!(decode("a.b"), Err(MandateVerifyError::MalformedStructure)));
        assert!(matches!(decode("a.b.c.d"), Err(MandateVerifyError::MalformedStructure)));
    }

    #[test]
    fn decode_rejects_invalid_base64() {
        assert!(matches!(decode("!!!.bbbb.cccc"), Err(MandateVerifyError::MalformedStructure)));
    }
}
