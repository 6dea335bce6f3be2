// json.encode / json.decode, mostly for handling http.* bodies.

use mlua::{Lua, LuaSerdeExt, Table, Value};

use super::{coerce_string, export, reply};

pub(crate) fn table(lua: &Lua) -> mlua::Result<Table> {
    let json = lua.create_table()?;

    json.set(
        "encode",
        lua.create_function(|lua, value: Value| {
            let result = export(lua, value)
                .map_err(|e| e.to_string())
                .and_then(|v| serde_json::to_string(&v).map_err(|e| e.to_string()))
                .map_err(|e| format!("json.encode(), {}", e));
            reply(lua, result)
        })?,
    )?;

    json.set(
        "decode",
        lua.create_function(|lua, text: Value| {
            let text = coerce_string(&text);
            let result = serde_json::from_str::<serde_json::Value>(&text)
                .map_err(|e| e.to_string())
                .and_then(|v| lua.to_value(&v).map_err(|e| e.to_string()))
                .map_err(|e| format!("json.decode({:?}), {}", text, e));
            reply(lua, result)
        })?,
    )?;

    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::test_support::{eval, expect_error_object};

    fn lua_with_json() -> Lua {
        let lua = Lua::new();
        lua.globals().set("json", table(&lua).unwrap()).unwrap();
        lua
    }

    #[test]
    fn test_decode_then_index() {
        let lua = lua_with_json();
        let name: String = lua
            .load(r#"local v = json.decode('{"name":"Ada","tags":["a","b"]}') return v.name .. #v.tags"#)
            .eval()
            .unwrap();
        assert_eq!(name, "Ada2");
    }

    #[test]
    fn test_encode_array_and_object() {
        let lua = lua_with_json();
        let text: String = lua.load(r#"return json.encode({1, 2, 3})"#).eval().unwrap();
        assert_eq!(text, "[1,2,3]");

        let text: String = lua.load(r#"return json.encode({n = 1})"#).eval().unwrap();
        assert_eq!(text, r#"{"n":1}"#);
    }

    #[test]
    fn test_encode_sorts_keys() {
        let lua = lua_with_json();
        let text: String = lua
            .load(r#"return json.encode({zulu = 1, alpha = {yankee = true, bravo = false}, mike = "m"})"#)
            .eval()
            .unwrap();
        assert_eq!(text, r#"{"alpha":{"bravo":false,"yankee":true},"mike":"m","zulu":1}"#);
    }

    #[test]
    fn test_decode_invalid_is_error_object() {
        let lua = lua_with_json();
        let value = eval(&lua, r#"return json.decode("{nope")"#);
        assert!(expect_error_object(value).starts_with("json.decode("));
    }

    #[test]
    fn test_encode_function_is_error_object() {
        let lua = lua_with_json();
        let value = eval(&lua, r#"return json.encode(print)"#);
        expect_error_object(value);
    }
}
