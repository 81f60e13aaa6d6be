// Tests for value references: assignment, lifecycle, copies and userdata
use crate::*;
use std::os::raw::c_void;

#[test]
fn test_integer_round_trip() {
    let state = LuaState::new().unwrap();
    let mut value = LuaObject::new();
    value.assign_integer(&state, 424238335).unwrap();

    assert_eq!(value.type_of(), LuaType::Number);
    assert_eq!(value.type_name(), "number");
    assert_eq!(value.to_integer().unwrap(), 424238335);
    assert_eq!(state.get_top(), 0);
}

#[test]
fn test_literal_round_trips() {
    let state = LuaState::new().unwrap();
    let mut value = LuaObject::new();

    value.assign_number(&state, 3.25).unwrap();
    assert_eq!(value.type_name(), "number");
    assert_eq!(value.to_number().unwrap(), 3.25);

    value.assign_boolean(&state, true).unwrap();
    assert!(value.is_boolean());
    assert_eq!(value.type_name(), "boolean");
    assert!(value.to_boolean().unwrap());

    value.assign_boolean(&state, false).unwrap();
    assert!(!value.to_boolean().unwrap());

    value.assign_string(&state, "a\0b").unwrap();
    assert_eq!(value.type_name(), "string");
    assert_eq!(value.to_bytes().unwrap().as_deref(), Some(&b"a\0b"[..]));
    assert_eq!(value.raw_len().unwrap(), 3);

    value.assign_nil(&state).unwrap();
    assert!(value.is_nil());
    assert!(value.is_none_or_nil());
    assert!(!value.is_none());
    assert_eq!(value.type_name(), "nil");
    assert!(!value.to_boolean().unwrap());

    value.assign_new_table(&state, 4, 4).unwrap();
    assert!(value.is_table());
    assert_eq!(value.type_name(), "table");
    assert_eq!(value.raw_len().unwrap(), 0);

    assert_eq!(state.get_top(), 0);
}

#[test]
fn test_empty_reference() {
    let value = LuaObject::new();
    assert!(value.is_empty());
    assert_eq!(value.ref_key(), NO_REF);
    assert_eq!(value.type_of(), LuaType::None);
    assert_eq!(value.type_name(), "no value");
    assert!(value.is_none());
    assert!(value.is_none_or_nil());
    assert!(!value.is_nil());
    assert!(!value.is_boolean());
    assert!(!value.is_number());
    assert!(!value.is_integer());
    assert!(!value.is_string());
    assert!(!value.is_table());
    assert!(!value.is_user_data());
    assert!(!value.is_light_user_data());
    assert!(!value.is_function());
    assert!(!value.is_c_function());
    assert!(!value.is_thread());
    assert!(value.state().is_none());

    assert!(value.to_integer().unwrap_err().is_assertion());
    assert!(value.push().unwrap_err().is_assertion());

    let copy = value.clone();
    assert!(copy.is_empty());
}

#[test]
fn test_reset() {
    let state = LuaState::new().unwrap();
    let mut value = LuaObject::new();
    value.assign_integer(&state, 5).unwrap();
    assert!(!value.is_empty());

    value.reset();
    assert!(value.is_empty());
    assert!(value.is_none());

    // resetting an empty reference is a no-op
    value.reset();
    assert!(value.is_empty());
}

#[test]
fn test_copy_independence() {
    let state = LuaState::new().unwrap();
    let mut original = LuaObject::new();
    original.assign_integer(&state, 5).unwrap();

    let copy = original.clone();
    assert_ne!(copy.ref_key(), original.ref_key());

    original.reset();
    assert_eq!(copy.to_integer().unwrap(), 5);

    original.assign_integer(&state, 6).unwrap();
    assert_eq!(copy.to_integer().unwrap(), 5);
    assert_eq!(original.to_integer().unwrap(), 6);
}

#[test]
fn test_copies_share_table_identity() {
    let state = LuaState::new().unwrap();
    let mut table = LuaObject::new();
    table.assign_new_table(&state, 0, 0).unwrap();

    let alias = table.clone();
    alias.set_integer("n", 1).unwrap();
    assert_eq!(table.get_by_name("n").unwrap().to_integer().unwrap(), 1);
    assert!(table.raw_equal(&alias).unwrap());
}

#[test]
fn test_registry_slot_reuse() {
    let state = LuaState::new().unwrap();
    let mut first = LuaObject::new();
    first.assign_integer(&state, 1).unwrap();
    let slot = first.ref_key();
    first.reset();

    let mut second = LuaObject::new();
    second.assign_integer(&state, 2).unwrap();
    assert_eq!(second.ref_key(), slot);
}

#[test]
fn test_reassign_releases_old_slot() {
    let state = LuaState::new().unwrap();
    let mut value = LuaObject::new();
    value.assign_integer(&state, 1).unwrap();
    let old = value.ref_key();

    value.assign_integer(&state, 2).unwrap();
    assert_ne!(value.ref_key(), old);

    let mut other = LuaObject::new();
    other.assign_integer(&state, 3).unwrap();
    assert_eq!(other.ref_key(), old);
    assert_eq!(value.to_integer().unwrap(), 2);
}

#[test]
fn test_self_referential_reassign() {
    let state = LuaState::new().unwrap();
    let mut table = LuaObject::new();
    table.assign_new_table(&state, 0, 1).unwrap();
    table.set("self", &table).unwrap();

    let inner = table.get_by_name("self").unwrap();
    table.assign_object(&inner).unwrap();
    assert!(table.is_table());
    assert!(table.raw_equal(&inner).unwrap());

    // re-capture the value this reference already holds
    table.push().unwrap();
    table.capture_stack_position(&state, -1).unwrap();
    state.pop(1).unwrap();
    assert!(table.is_table());
    assert!(table.get_by_name("self").unwrap().raw_equal(&table).unwrap());
}

#[test]
fn test_from_stack() {
    let state = LuaState::new().unwrap();
    let mut value = LuaObject::new();
    value.assign_string(&state, "on stack").unwrap();
    value.push().unwrap();

    let captured = LuaObject::from_stack(&state, 1).unwrap();
    assert_eq!(state.get_top(), 1);
    state.pop(1).unwrap();
    assert_eq!(captured.to_str().unwrap().as_deref(), Some("on stack"));
}

#[test]
fn test_use_after_close() {
    let mut state = LuaState::new().unwrap();
    let mut value = LuaObject::new();
    value.assign_integer(&state, 7).unwrap();
    state.close();

    assert_eq!(value.type_of(), LuaType::None);
    assert!(!value.is_number());
    assert_eq!(value.to_integer(), Err(LuaError::StateClosed));
    assert_eq!(value.push(), Err(LuaError::StateClosed));
    assert!(!value.state().unwrap().is_open());

    let copy = value.clone();
    assert!(copy.is_empty());

    value.reset();
    assert!(value.is_empty());
}

#[test]
fn test_outlives_state() {
    let value = {
        let state = LuaState::new().unwrap();
        let mut value = LuaObject::new();
        value.assign_string(&state, "gone").unwrap();
        value
    };
    assert!(value.state().is_none());
    assert!(value.is_none());
    assert_eq!(value.to_str(), Err(LuaError::StateClosed));
}

#[test]
fn test_assign_object_across_states() {
    let first = LuaState::new().unwrap();
    let second = LuaState::new().unwrap();

    let mut source = LuaObject::new();
    source.assign_integer(&first, 11).unwrap();

    let mut target = LuaObject::new();
    target.assign_integer(&second, 1).unwrap();
    target.assign_object(&source).unwrap();
    assert!(target.state().unwrap().same_state(&first.handle()));
    assert_eq!(target.to_integer().unwrap(), 11);

    let mut wrong = LuaObject::new();
    assert!(wrong.assign_value(&second, &source).unwrap_err().is_assertion());
    assert!(wrong.is_empty());
    assert_eq!(second.get_top(), 0);
}

#[test]
fn test_light_user_data() {
    let state = LuaState::new().unwrap();
    let mut payload = 5i32;
    let ptr = &mut payload as *mut i32 as *mut c_void;

    let mut value = LuaObject::new();
    value.assign_light_user_data(&state, ptr).unwrap();
    assert!(value.is_light_user_data());
    assert!(value.is_user_data());
    assert_eq!(value.type_of(), LuaType::LightUserData);
    assert_eq!(value.type_name(), "userdata");
    assert_eq!(value.to_user_data().unwrap(), ptr);
}

#[test]
fn test_full_user_data() {
    let state = LuaState::new().unwrap();
    let mut payload = 9u64;
    let ptr = &mut payload as *mut u64 as *mut c_void;

    let mut value = LuaObject::new();
    value.assign_user_data(&state, ptr).unwrap();
    assert!(value.is_user_data());
    assert!(!value.is_light_user_data());
    assert_eq!(value.type_of(), LuaType::UserData);
    assert_eq!(value.type_name(), "userdata");
    assert_eq!(value.raw_len().unwrap(), std::mem::size_of::<*mut c_void>());
    assert_eq!(value.to_user_data().unwrap(), ptr);

    value.assign_integer(&state, 1).unwrap();
    assert!(value.to_user_data().unwrap_err().is_assertion());
}

#[test]
fn test_to_pointer_identity() {
    let state = LuaState::new().unwrap();
    let mut payload = 3u64;
    let ptr = &mut payload as *mut u64 as *mut c_void;

    let mut light = LuaObject::new();
    light.assign_light_user_data(&state, ptr).unwrap();
    assert_eq!(light.to_pointer().unwrap(), ptr as *const c_void);

    // a full userdata is identified by its block, not by the pointer inside
    let mut full = LuaObject::new();
    full.assign_user_data(&state, ptr).unwrap();
    let block = full.to_pointer().unwrap();
    assert!(!block.is_null());
    assert_ne!(block, ptr as *const c_void);
    assert_eq!(full.clone().to_pointer().unwrap(), block);

    let mut other = LuaObject::new();
    other.assign_user_data(&state, ptr).unwrap();
    assert_ne!(other.to_pointer().unwrap(), block);

    let mut number = LuaObject::new();
    number.assign_integer(&state, 1).unwrap();
    assert!(number.to_pointer().unwrap().is_null());
    assert!(LuaObject::new().to_pointer().unwrap_err().is_assertion());
    assert_eq!(state.get_top(), 0);
}

#[test]
fn test_functions_and_threads() {
    let state = LuaState::with_options(StateOptions::default().with_libs()).unwrap();
    state
        .do_string("f = function() end; co = coroutine.create(f)")
        .unwrap();
    let globals = state.globals().unwrap();

    let f = globals.get_by_name("f").unwrap();
    assert!(f.is_function());
    assert!(!f.is_c_function());
    assert_eq!(f.type_name(), "function");

    let print = globals.get_by_name("print").unwrap();
    assert!(print.is_function());
    assert!(print.is_c_function());

    let co = globals.get_by_name("co").unwrap();
    assert!(co.is_thread());
    assert_eq!(co.type_name(), "thread");
}

#[test]
fn test_debug_format() {
    let state = LuaState::new().unwrap();
    let mut value = LuaObject::new();
    assert_eq!(format!("{:?}", value), format!("LuaObject(ref={}, type=no value)", NO_REF));
    value.assign_boolean(&state, true).unwrap();
    assert!(format!("{:?}", value).ends_with("type=boolean)"));
}
