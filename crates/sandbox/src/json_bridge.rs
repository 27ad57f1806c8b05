// SPDX-License-Identifier: Apache-2.0

//! Conversion between `serde_json::Value` and QuickJS values. Hand-rolled
//! rather than pulled from a `serde`-integration crate since the only
//! shapes that ever cross this boundary are the plain JSON produced by the
//! message handler's decode step (§4.2) -- objects, arrays, strings,
//! numbers, bools, null.

use rquickjs::{Array, Ctx, Object, Type, Value};

pub fn json_to_js<'js>(ctx: &Ctx<'js>, value: &serde_json::Value) -> rquickjs::Result<Value<'js>> {
    Ok(match value {
        serde_json::Value::Null => Value::new_null(ctx.clone()),
        serde_json::Value::Bool(b) => Value::new_bool(ctx.clone(), *b),
        serde_json::Value::Number(n) => Value::new_float(ctx.clone(), n.as_f64().unwrap_or(0.0)),
        serde_json::Value::String(s) => {
            rquickjs::String::from_str(ctx.clone(), s)?.into_value()
        }
        serde_json::Value::Array(items) => {
            let array = Array::new(ctx.clone())?;
            for (i, item) in items.iter().enumerate() {
                array.set(i, json_to_js(ctx, item)?)?;
            }
            array.into_value()
        }
        serde_json::Value::Object(map) => {
            let object = Object::new(ctx.clone())?;
            for (key, item) in map {
                object.set(key.as_str(), json_to_js(ctx, item)?)?;
            }
            object.into_value()
        }
    })
}

pub fn js_to_json(value: &Value<'_>) -> serde_json::Value {
    match value.type_of() {
        Type::Undefined | Type::Null | Type::Uninitialized => serde_json::Value::Null,
        Type::Bool => serde_json::json!(value.as_bool().unwrap_or(false)),
        Type::Int => serde_json::json!(value.as_int().unwrap_or_default()),
        Type::Float => serde_json::json!(value.as_float().unwrap_or_default()),
        Type::String => serde_json::json!(
            value
                .as_string()
                .and_then(|s| s.to_string().ok())
                .unwrap_or_default()
        ),
        Type::Array => {
            let array = value.as_array().expect("type checked");
            let mut out = Vec::with_capacity(array.len());
            for item in array.iter::<Value>().flatten() {
                out.push(js_to_json(&item));
            }
            serde_json::Value::Array(out)
        }
        Type::Object => {
            let object = value.as_object().expect("type checked");
            let mut map = serde_json::Map::new();
            for key in object.keys::<String>().flatten() {
                if let Ok(item) = object.get::<_, Value>(key.as_str()) {
                    map.insert(key, js_to_json(&item));
                }
            }
            serde_json::Value::Object(map)
        }
        _ => serde_json::Value::Null,
    }
}
