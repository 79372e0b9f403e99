//! JSON <-> `boa_engine` value conversion and the native host functions
//! exposed to scripts, grounded on the teacher's `scripting/js_engine.rs`
//! `json_to_js` / `js_to_json` pair and its `register_method` helper.

use base64::Engine as _;
use boa_engine::object::builtins::JsArray;
use boa_engine::property::PropertyKey;
use boa_engine::{js_string, Context, JsNativeError, JsObject, JsResult, JsValue};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

pub fn json_to_js(value: &serde_json::Value, context: &mut Context) -> JsResult<JsValue> {
    match value {
        serde_json::Value::Null => Ok(JsValue::null()),
        serde_json::Value::Bool(b) => Ok(JsValue::from(*b)),
        serde_json::Value::Number(n) => Ok(JsValue::from(n.as_f64().unwrap_or(0.0))),
        serde_json::Value::String(s) => Ok(JsValue::from(js_string!(s.as_str()))),
        serde_json::Value::Array(items) => {
            let array = JsArray::new(context);
            for item in items {
                array.push(json_to_js(item, context)?, context)?;
            }
            Ok(array.into())
        }
        serde_json::Value::Object(map) => {
            let obj = JsObject::with_object_proto(context.intrinsics());
            for (key, val) in map {
                let js_val = json_to_js(val, context)?;
                obj.set(js_string!(key.as_str()), js_val, false, context)?;
            }
            Ok(obj.into())
        }
    }
}

pub fn js_to_json(value: &JsValue, context: &mut Context) -> JsResult<serde_json::Value> {
    if value.is_null_or_undefined() {
        return Ok(serde_json::Value::Null);
    }
    if let Some(b) = value.as_boolean() {
        return Ok(serde_json::Value::Bool(b));
    }
    if let Some(n) = value.as_number() {
        return Ok(serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null));
    }
    if let Some(s) = value.as_string() {
        return Ok(serde_json::Value::String(s.to_std_string_escaped()));
    }
    if let Some(obj) = value.as_object() {
        if obj.is_array() {
            let array = JsArray::from_object(obj.clone())?;
            let len = array.length(context)?;
            let mut out = Vec::with_capacity(len as usize);
            for i in 0..len {
                let item = array.get(i, context)?;
                out.push(js_to_json(&item, context)?);
            }
            return Ok(serde_json::Value::Array(out));
        }
        let mut map = serde_json::Map::new();
        for key in obj.clone().own_property_keys(context)? {
            if let PropertyKey::String(ref name) = key {
                let name = name.to_std_string_escaped();
                let val = obj.get(js_string!(name.as_str()), context)?;
                map.insert(name, js_to_json(&val, context)?);
            }
        }
        return Ok(serde_json::Value::Object(map));
    }
    Ok(serde_json::Value::Null)
}

/// Build a plain JS object from a string map, used for headers/query/params.
pub fn string_map_to_js(
    pairs: &[(String, String)],
    context: &mut Context,
) -> JsResult<JsObject> {
    let obj = JsObject::with_object_proto(context.intrinsics());
    for (key, value) in pairs {
        obj.set(js_string!(key.as_str()), js_string!(value.as_str()), false, context)?;
    }
    Ok(obj)
}

pub fn base64_encode(input: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(input.as_bytes())
}

pub fn base64_decode(input: &str) -> JsResult<String> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(input)
        .map_err(|e| JsNativeError::typ().with_message(format!("invalid base64: {e}")))?;
    String::from_utf8(bytes)
        .map_err(|e| JsNativeError::typ().with_message(format!("invalid utf-8: {e}")).into())
}

pub fn md5_hex(input: &str) -> String {
    let digest = md5::compute(input.as_bytes());
    hex::encode(digest.0)
}

pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn hmac_sha256_hex(key: &str, input: &str) -> JsResult<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key.as_bytes())
        .map_err(|e| JsNativeError::typ().with_message(format!("invalid hmac key: {e}")))?;
    mac.update(input.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Generic `crypto.hmac(alg, key, data)`: dispatches on `alg` to the matching
/// MAC construction. Unsupported algorithms are a script-facing type error.
pub fn hmac_hex(alg: &str, key: &str, input: &str) -> JsResult<String> {
    match alg.to_ascii_lowercase().as_str() {
        "sha256" => hmac_sha256_hex(key, input),
        "md5" => {
            let mut mac = Hmac::<md5::Md5>::new_from_slice(key.as_bytes())
                .map_err(|e| JsNativeError::typ().with_message(format!("invalid hmac key: {e}")))?;
            mac.update(input.as_bytes());
            Ok(hex::encode(mac.finalize().into_bytes()))
        }
        other => Err(JsNativeError::typ()
            .with_message(format!("unsupported hmac algorithm: {other}"))
            .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_round_trips() {
        let encoded = base64_encode("hello currier");
        assert_eq!(base64_decode(&encoded).unwrap(), "hello currier");
    }

    #[test]
    fn sha256_is_stable() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn hmac_changes_with_key() {
        let a = hmac_sha256_hex("key1", "payload").unwrap();
        let b = hmac_sha256_hex("key2", "payload").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn hmac_hex_dispatches_on_algorithm() {
        assert_eq!(
            hmac_hex("sha256", "key", "payload").unwrap(),
            hmac_sha256_hex("key", "payload").unwrap()
        );
        assert!(hmac_hex("md5", "key", "payload").is_ok());
        assert!(hmac_hex("bogus", "key", "payload").is_err());
    }

    #[test]
    fn json_round_trips_through_js() {
        let mut context = Context::default();
        let value = serde_json::json!({"a": 1, "b": [true, null, "x"]});
        let js_val = json_to_js(&value, &mut context).unwrap();
        let back = js_to_json(&js_val, &mut context).unwrap();
        assert_eq!(value, back);
    }
}
