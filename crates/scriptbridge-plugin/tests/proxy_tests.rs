use scriptbridge_core::{
    BridgeError, ChannelRef, HostFunction, HostValue, MappingRef, NumberKind, PointerRef,
    SequenceRef, StructRef, StructType, TypeHint, Unmarshal,
};
use scriptbridge_plugin::{Bridge, BridgeConfig};
use std::sync::Arc;

const SCRIPT: &str = r#"
function Sum(xs)
    local total = 0
    for _, v in xs() do total = total + v end
    return total
end

function Len(x) return #x end
function Get(x, k) return x[k] end
function Set(x, k, v) x[k] = v end
function Same(a, b) return a == b end
function Describe(x) return tostring(x) end
function Kind(x) return host.kind(x) end

function AppendTwo(xs)
    local grown = xs:append(7, 8)
    return #grown
end

function Capacity(x) return x:capacity() end

function Keys(m)
    local keys = {}
    for k in pairs(m) do keys[#keys + 1] = k end
    return table.concat(keys, ",")
end

function Drain(ch)
    local total = 0
    for _, v in ch() do total = total + v end
    return total
end

function Produce(ch, n)
    for i = 1, n do ch:send(i) end
    ch:close()
end

function ReceiveOne(ch)
    local v, ok = ch:receive()
    if ok then return v end
    return "closed"
end

function Deref(p) return p() end
function Store(p, v) p(v) end

function Norm(pt) return pt:Norm1() end
function Scale(pt, k) pt:Scale(k) end
function HasScale(pt) return pt.Scale ~= nil end

function Twice(f, n) return f(f(n)) end
"#;

fn bridge() -> Bridge {
    let mut bridge = Bridge::new(BridgeConfig::default()).unwrap();
    bridge.exec(SCRIPT, "=proxies").unwrap();
    bridge
}

fn numbers() -> SequenceRef {
    SequenceRef::of(vec![1_i64, 2, 3])
}

fn call_i64(bridge: &Bridge, name: &str, args: Vec<HostValue>) -> i64 {
    let mut out = 0_i64;
    bridge.call_unmarshal(&mut out, name, args).unwrap();
    out
}

fn call_string(bridge: &Bridge, name: &str, args: Vec<HostValue>) -> String {
    let mut out = String::new();
    bridge.call_unmarshal(&mut out, name, args).unwrap();
    out
}

fn point_type() -> Arc<StructType> {
    StructType::builder("Point")
        .field("X", NumberKind::I64)
        .field("Y", NumberKind::I64)
        .method("Norm1", Vec::<TypeHint>::new(), |this, _| {
            let x = this.field("X").and_then(|v| v.as_i64()).unwrap_or_default();
            let y = this.field("Y").and_then(|v| v.as_i64()).unwrap_or_default();
            Ok(HostValue::Int(x.abs() + y.abs()))
        })
        .pointer_method("Scale", vec![TypeHint::Number(NumberKind::I64)], |this, args| {
            let k = args.first().and_then(HostValue::as_i64).unwrap_or(1);
            for name in ["X", "Y"] {
                let v = this.field(name).and_then(|v| v.as_i64()).unwrap_or_default();
                this.set_field(name, HostValue::Int(v * k))?;
            }
            Ok(HostValue::Nil)
        })
        .build()
}

#[test]
fn test_sequence_iteration_and_length() {
    let bridge = bridge();
    let seq = HostValue::Sequence(numbers());
    assert_eq!(call_i64(&bridge, "Sum", vec![seq.clone()]), 6);
    assert_eq!(call_i64(&bridge, "Len", vec![seq.clone()]), 3);
    assert_eq!(call_i64(&bridge, "Get", vec![seq, HostValue::Int(2)]), 2);
}

#[test]
fn test_sequence_index_out_of_range_raises() {
    let bridge = bridge();
    for index in [0_i64, 4] {
        let err = bridge
            .call("Get", vec![HostValue::Sequence(numbers()), HostValue::Int(index)])
            .unwrap_err();
        assert!(err.to_string().contains("index out of range"), "{err}");
    }
}

#[test]
fn test_value_handle_rejects_assignment() {
    let bridge = bridge();
    let seq = numbers();
    let err = bridge
        .call(
            "Set",
            vec![HostValue::Sequence(seq.clone()), HostValue::Int(1), HostValue::Int(10)],
        )
        .unwrap_err();
    assert!(err.to_string().contains("invalid operation on value handle"), "{err}");
    assert_eq!(seq.get(0), Some(HostValue::Int(1)));
}

#[test]
fn test_pointer_handle_mutates_host_storage() {
    let bridge = bridge();
    let seq = numbers();
    bridge
        .call(
            "Set",
            vec![HostValue::pointer(seq.clone()), HostValue::Int(1), HostValue::Int(10)],
        )
        .unwrap();
    assert_eq!(seq.to_vec::<i64>().unwrap(), vec![10, 2, 3]);
}

#[test]
fn test_assignment_conversion_error_names_argument_three() {
    let bridge = bridge();
    let err = bridge
        .call(
            "Set",
            vec![HostValue::pointer(numbers()), HostValue::Int(1), HostValue::from("ten")],
        )
        .unwrap_err();
    assert!(err.to_string().contains("bad argument #3"), "{err}");
}

#[test]
fn test_append_returns_new_sequence() {
    let bridge = bridge();
    let seq = numbers();
    assert_eq!(call_i64(&bridge, "AppendTwo", vec![HostValue::Sequence(seq.clone())]), 5);
    assert_eq!(seq.len(), 3);
    assert!(call_i64(&bridge, "Capacity", vec![HostValue::Sequence(seq)]) >= 3);
}

#[test]
fn test_mapping_read_write_delete() {
    let bridge = bridge();
    let map = MappingRef::new(
        TypeHint::String,
        [("b", HostValue::from("two")), ("a", HostValue::from("one"))],
    );

    assert_eq!(
        call_string(&bridge, "Get", vec![HostValue::Mapping(map.clone()), HostValue::from("a")]),
        "one"
    );
    assert!(
        bridge
            .call("Get", vec![HostValue::Mapping(map.clone()), HostValue::from("zzz")])
            .unwrap()
            .is_nil()
    );
    assert_eq!(call_string(&bridge, "Keys", vec![HostValue::Mapping(map.clone())]), "b,a");

    bridge
        .call(
            "Set",
            vec![HostValue::pointer(map.clone()), HostValue::from("c"), HostValue::from("three")],
        )
        .unwrap();
    bridge
        .call(
            "Set",
            vec![HostValue::pointer(map.clone()), HostValue::from("b"), HostValue::Nil],
        )
        .unwrap();
    assert_eq!(map.keys(), vec!["a".to_string(), "c".to_string()]);
    assert_eq!(call_i64(&bridge, "Len", vec![HostValue::Mapping(map)]), 2);
}

#[test]
fn test_struct_fields_and_methods() {
    let bridge = bridge();
    let point = StructRef::with_fields(
        point_type(),
        [("X", HostValue::Int(3)), ("Y", HostValue::Int(-4))],
    )
    .unwrap();

    assert_eq!(
        call_i64(&bridge, "Get", vec![HostValue::Struct(point.clone()), HostValue::from("X")]),
        3
    );
    assert_eq!(call_i64(&bridge, "Norm", vec![HostValue::Struct(point.clone())]), 7);

    let mut visible = true;
    bridge
        .call_unmarshal(&mut visible, "HasScale", vec![HostValue::Struct(point.clone())])
        .unwrap();
    assert!(!visible);

    bridge
        .call("Scale", vec![HostValue::pointer(point.clone()), HostValue::Int(2)])
        .unwrap();
    assert_eq!(point.field("X"), Some(HostValue::Int(6)));
    assert_eq!(point.field("Y"), Some(HostValue::Int(-8)));

    let err = bridge
        .call("Scale", vec![HostValue::pointer(point), HostValue::from("x")])
        .unwrap_err();
    assert!(err.to_string().contains("bad argument #2"), "{err}");
}

#[test]
fn test_channel_drained_by_script() {
    let bridge = bridge();
    let ch = ChannelRef::new(TypeHint::Number(NumberKind::I64), 4);
    for i in 1..=3_i64 {
        ch.send(HostValue::Int(i)).unwrap();
    }
    ch.close().unwrap();

    assert_eq!(call_i64(&bridge, "Len", vec![HostValue::Channel(ch.clone())]), 3);
    assert_eq!(call_i64(&bridge, "Drain", vec![HostValue::Channel(ch.clone())]), 6);
    assert_eq!(call_string(&bridge, "ReceiveOne", vec![HostValue::Channel(ch)]), "closed");
}

#[test]
fn test_channel_filled_by_script() {
    let bridge = bridge();
    let ch = ChannelRef::new(TypeHint::Number(NumberKind::I64), 4);
    bridge
        .call("Produce", vec![HostValue::pointer(ch.clone()), HostValue::Int(3)])
        .unwrap();

    let received: Vec<i64> = std::iter::from_fn(|| ch.receive())
        .map(|v| i64::unmarshal(v).unwrap())
        .collect();
    assert_eq!(received, vec![1, 2, 3]);

    let err = bridge
        .call("Produce", vec![HostValue::pointer(ch.clone()), HostValue::Int(1)])
        .unwrap_err();
    assert!(err.to_string().contains("closed channel"), "{err}");
}

#[test]
fn test_unbuffered_channel_hands_off_to_host_thread() {
    let bridge = bridge();
    let ch = ChannelRef::new(TypeHint::Number(NumberKind::I64), 0);
    let consumer = ch.clone();
    let receiver = std::thread::spawn(move || {
        std::iter::from_fn(|| consumer.receive())
            .map(|v| i64::unmarshal(v).unwrap())
            .collect::<Vec<_>>()
    });

    bridge
        .call("Produce", vec![HostValue::pointer(ch.clone()), HostValue::Int(3)])
        .unwrap();
    assert_eq!(receiver.join().unwrap(), vec![1, 2, 3]);
    assert!(ch.is_closed());
}

#[test]
fn test_channel_value_handle_cannot_send() {
    let bridge = bridge();
    let ch = ChannelRef::new(TypeHint::Number(NumberKind::I64), 1);
    let err = bridge
        .call("Produce", vec![HostValue::Channel(ch.clone()), HostValue::Int(1)])
        .unwrap_err();
    assert!(err.to_string().contains("invalid operation on value handle"), "{err}");
    assert!(!ch.is_closed());
}

#[test]
fn test_pointer_to_primitive() {
    let bridge = bridge();
    let cell = PointerRef::new(HostValue::Int(41));
    assert_eq!(call_i64(&bridge, "Deref", vec![HostValue::Pointer(cell.clone())]), 41);

    bridge
        .call("Store", vec![HostValue::Pointer(cell.clone()), HostValue::Int(42)])
        .unwrap();
    assert_eq!(cell.load(), HostValue::Int(42));
}

#[test]
fn test_equality_is_identity() {
    let bridge = bridge();
    let seq = numbers();

    let mut same = false;
    bridge
        .call_unmarshal(
            &mut same,
            "Same",
            vec![HostValue::Sequence(seq.clone()), HostValue::Sequence(seq.clone())],
        )
        .unwrap();
    assert!(same);

    bridge
        .call_unmarshal(
            &mut same,
            "Same",
            vec![HostValue::Sequence(seq.clone()), HostValue::Sequence(numbers())],
        )
        .unwrap();
    assert!(!same);

    let err = bridge
        .call(
            "Same",
            vec![HostValue::Sequence(seq.clone()), HostValue::pointer(seq)],
        )
        .unwrap_err();
    assert!(err.to_string().contains("mixed"), "{err}");
}

#[test]
fn test_tostring_and_kind() {
    let bridge = bridge();
    let point = StructRef::new(point_type());
    assert_eq!(
        call_string(&bridge, "Describe", vec![HostValue::pointer(point.clone())]),
        "Point (mutable handle)"
    );
    assert_eq!(
        call_string(&bridge, "Kind", vec![HostValue::Struct(point)]),
        "struct_like"
    );
}

#[test]
fn test_host_function_called_from_script() {
    let bridge = bridge();
    let inc = HostFunction::new("inc", vec![TypeHint::Number(NumberKind::I64)], |args| {
        let n = args.first().and_then(HostValue::as_i64).unwrap_or_default();
        Ok(HostValue::Int(n + 1))
    });
    assert_eq!(
        call_i64(&bridge, "Twice", vec![HostValue::Function(inc), HostValue::Int(5)]),
        7
    );

    let fail = HostFunction::new("fail", Vec::<TypeHint>::new(), |_| Err(BridgeError::host("refused")));
    let err = bridge
        .call("Twice", vec![HostValue::Function(fail), HostValue::Int(0)])
        .unwrap_err();
    assert!(err.to_string().contains("refused"), "{err}");
}
