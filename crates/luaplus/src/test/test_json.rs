// Tests for the JSON bridge
use crate::*;
use serde_json::json;

fn global(state: &LuaState, name: &str) -> LuaObject {
    state.globals().unwrap().get_by_name(name).unwrap()
}

#[test]
fn test_to_json() {
    let state = LuaState::new().unwrap();
    state
        .do_string(
            r#"
            data = {
                name = "demo",
                list = {1, 2, 3},
                ratio = 1.5,
                flag = true,
                empty = {},
                nested = { inner = { "x" } },
            }
        "#,
        )
        .unwrap();

    let value = global(&state, "data").to_json().unwrap();
    assert_eq!(
        value,
        json!({
            "name": "demo",
            "list": [1, 2, 3],
            "ratio": 1.5,
            "flag": true,
            "empty": [],
            "nested": { "inner": ["x"] },
        })
    );
    assert_eq!(state.get_top(), 0);
}

#[test]
fn test_mixed_keys_become_object() {
    let state = LuaState::new().unwrap();
    state.do_string("mixed = { 10, 20, label = 'x' }; sparse = { [1] = 'a', [3] = 'c' }").unwrap();

    assert_eq!(
        global(&state, "mixed").to_json().unwrap(),
        json!({ "1": 10, "2": 20, "label": "x" })
    );
    assert_eq!(
        global(&state, "sparse").to_json().unwrap(),
        json!({ "1": "a", "3": "c" })
    );
}

#[test]
fn test_scalars_to_json() {
    let state = LuaState::new().unwrap();
    let mut value = LuaObject::new();

    value.assign_nil(&state).unwrap();
    assert_eq!(value.to_json().unwrap(), json!(null));
    value.assign_integer(&state, -4).unwrap();
    assert_eq!(value.to_json().unwrap(), json!(-4));
    value.assign_string(&state, "s").unwrap();
    assert_eq!(value.to_json().unwrap(), json!("s"));
}

#[test]
fn test_to_json_errors() {
    let state = LuaState::new().unwrap();
    state
        .do_string(
            r#"
            cyclic = {}
            cyclic.self = cyclic
            fn = function() end
            nan = 0/0
            bad_key = { [true] = 1 }
            shared = {}
            dag = { a = shared, b = shared }
        "#,
        )
        .unwrap();

    for name in ["cyclic", "fn", "nan", "bad_key"] {
        let err = global(&state, name).to_json().unwrap_err();
        assert!(matches!(err, LuaError::Conversion(_)), "{}: {:?}", name, err);
    }
    // repeated references without a cycle are fine
    assert_eq!(global(&state, "dag").to_json().unwrap(), json!({ "a": [], "b": [] }));
    assert_eq!(state.get_top(), 0);

    assert!(LuaObject::new().to_json().unwrap_err().is_assertion());
}

#[test]
fn test_assign_json() {
    let state = LuaState::new().unwrap();
    let source = json!({
        "a": [1, 2, 3],
        "s": "t",
        "f": 2.5,
        "ok": false,
        "deep": { "list": ["x", "y"] },
    });

    let mut value = LuaObject::new();
    value.assign_json(&state, &source).unwrap();
    assert!(value.is_table());
    assert_eq!(value.get_by_name("a").unwrap().raw_len().unwrap(), 3);
    assert_eq!(value.get_as::<String, _>("s").unwrap(), "t");
    assert_eq!(value.to_json().unwrap(), source);
    assert_eq!(state.get_top(), 0);
}

fn nested_array(levels: usize) -> serde_json::Value {
    let mut value = json!(1);
    for _ in 0..levels {
        value = json!([value]);
    }
    value
}

#[test]
fn test_deep_nesting_rejected() {
    let state = LuaState::new().unwrap();
    state
        .do_string(
            r#"
            local function nest(levels)
                local root = {}
                local t = root
                for _ = 2, levels do
                    t[1] = {}
                    t = t[1]
                end
                return root
            end
            deep = nest(200)
            shallow = nest(100)
        "#,
        )
        .unwrap();

    let err = global(&state, "deep").to_json().unwrap_err();
    assert_eq!(err, LuaError::Conversion("nesting too deep".to_string()));
    assert!(global(&state, "shallow").to_json().is_ok());
    assert_eq!(state.get_top(), 0);

    let mut value = LuaObject::new();
    let err = value.assign_json(&state, &nested_array(200)).unwrap_err();
    assert_eq!(err, LuaError::Conversion("nesting too deep".to_string()));
    assert!(value.is_empty());
    assert_eq!(state.get_top(), 0);

    let source = nested_array(100);
    value.assign_json(&state, &source).unwrap();
    assert_eq!(value.to_json().unwrap(), source);
    assert_eq!(state.get_top(), 0);
}

#[test]
fn test_options_from_json() {
    let options: StateOptions =
        serde_json::from_str(r#"{ "strict_type_checks": true, "open_libs": true }"#).unwrap();
    assert!(options.strict_type_checks);
    assert!(options.open_libs);
    assert_eq!(options.convert_on_coerce, StateOptions::default().convert_on_coerce);
}
