//! Built-in node library.
//!
//! Composable nodes, grouped by palette category:
//! - **Input**: constants and the tick clock
//! - **Math**: arithmetic, clamping, range mapping, oscillators
//! - **Logic**: boolean combinators, comparison, selection
//! - **Color** / **Array**: mixing and packing
//! - **Media**: playback state driven by finish pulses
//! - **Group**: gate and proxy boundary nodes
//! - **Output**: sink nodes that emit dispatches to clients

use crate::config::{ConfigField, ConfigValues};
use crate::dispatch::TargetSelector;
use crate::error::SinkError;
use crate::ports::{Port, PortType};
use crate::registry::{NodeContext, NodeDefinition, NodeRegistry, SinkContext};
use crate::value::{Color, PortValues, Value};
use serde_json::json;
use std::f64::consts::TAU;

pub const NUMBER_NODE_TYPE: &str = "input.number";
pub const BOOLEAN_NODE_TYPE: &str = "input.boolean";
pub const STRING_NODE_TYPE: &str = "input.string";
pub const COLOR_NODE_TYPE: &str = "input.color";
pub const TIME_NODE_TYPE: &str = "input.time";
pub const BINARY_NODE_TYPE: &str = "math.binary";
pub const CLAMP_NODE_TYPE: &str = "math.clamp";
pub const MAP_RANGE_NODE_TYPE: &str = "math.mapRange";
pub const OSCILLATOR_NODE_TYPE: &str = "math.oscillator";
pub const TO_FUZZY_NODE_TYPE: &str = "math.toFuzzy";
pub const AND_NODE_TYPE: &str = "logic.and";
pub const OR_NODE_TYPE: &str = "logic.or";
pub const NOT_NODE_TYPE: &str = "logic.not";
pub const COMPARE_NODE_TYPE: &str = "logic.compare";
pub const SELECT_NODE_TYPE: &str = "logic.select";
pub const MIX_NODE_TYPE: &str = "color.mix";
pub const PACK_NODE_TYPE: &str = "array.pack";
pub const MEDIA_PLAYER_NODE_TYPE: &str = "media.player";
pub const GATE_NODE_TYPE: &str = "group.gate";
pub const PROXY_NODE_TYPE: &str = "group.proxy";
pub const COMMAND_NODE_TYPE: &str = "output.command";
pub const LIGHT_NODE_TYPE: &str = "output.light";

/// Output id a gate node reports its state on. Not a declared port.
pub const GATE_ACTIVE_OUTPUT: &str = "active";

const PACK_SLOTS: usize = 4;

/// Register every built-in definition, in palette order.
pub fn register_builtin_nodes(registry: &mut NodeRegistry) {
    // ═══════════════════════════════════════════════════════════════════════
    // INPUT
    // ═══════════════════════════════════════════════════════════════════════

    registry.register(
        NodeDefinition::new(NUMBER_NODE_TYPE, "Number", "Input", number_constant)
            .describe("A fixed number")
            .output(Port::data("value", "Value", PortType::Number).with_default(0.0))
            .config(ConfigField::number("value", "Value", 0.0)),
    );
    registry.register(
        NodeDefinition::new(BOOLEAN_NODE_TYPE, "Boolean", "Input", boolean_constant)
            .describe("A fixed on/off switch")
            .output(Port::data("value", "Value", PortType::Boolean).with_default(false))
            .config(ConfigField::boolean("value", "Value", false)),
    );
    registry.register(
        NodeDefinition::new(STRING_NODE_TYPE, "Text", "Input", string_constant)
            .output(Port::data("value", "Value", PortType::String).with_default(""))
            .config(ConfigField::string("value", "Value", "")),
    );
    registry.register(
        NodeDefinition::new(COLOR_NODE_TYPE, "Color", "Input", color_constant)
            .describe("A fixed color, as #rrggbb")
            .output(Port::data("value", "Color", PortType::Color).with_default(Color::WHITE))
            .config(ConfigField::string("value", "Color", "#ffffff")),
    );
    registry.register(
        NodeDefinition::new(TIME_NODE_TYPE, "Time", "Input", tick_time)
            .describe("Show time and frame delta, in seconds")
            .output(Port::data("time", "Time", PortType::Number).with_default(0.0))
            .output(Port::data("delta", "Delta", PortType::Number).with_default(0.0)),
    );

    // ═══════════════════════════════════════════════════════════════════════
    // MATH
    // ═══════════════════════════════════════════════════════════════════════

    registry.register(
        NodeDefinition::new(BINARY_NODE_TYPE, "Math", "Math", binary_op)
            .input(Port::data("a", "A", PortType::Number).with_default(0.0))
            .input(Port::data("b", "B", PortType::Number).with_default(0.0))
            .output(Port::data("result", "Result", PortType::Number).with_default(0.0))
            .config(ConfigField::select(
                "operation",
                "Operation",
                &["add", "subtract", "multiply", "divide", "modulo", "min", "max", "power"],
                "add",
            )),
    );
    registry.register(
        NodeDefinition::new(CLAMP_NODE_TYPE, "Clamp", "Math", clamp)
            .input(Port::data("value", "Value", PortType::Number).with_default(0.0))
            .output(Port::data("result", "Result", PortType::Number).with_default(0.0))
            .config(ConfigField::number("min", "Min", 0.0))
            .config(ConfigField::number("max", "Max", 1.0)),
    );
    registry.register(
        NodeDefinition::new(MAP_RANGE_NODE_TYPE, "Map Range", "Math", map_range)
            .describe("Linearly remap a value from one range to another")
            .input(Port::data("value", "Value", PortType::Number).with_default(0.0))
            .output(Port::data("result", "Result", PortType::Number).with_default(0.0))
            .config(ConfigField::number("inMin", "In Min", 0.0))
            .config(ConfigField::number("inMax", "In Max", 1.0))
            .config(ConfigField::number("outMin", "Out Min", 0.0))
            .config(ConfigField::number("outMax", "Out Max", 1.0))
            .config(ConfigField::boolean("clamp", "Clamp", true)),
    );
    registry.register(
        NodeDefinition::new(OSCILLATOR_NODE_TYPE, "Oscillator", "Math", oscillator)
            .describe("Periodic wave driven by show time")
            .output(Port::data("value", "Value", PortType::Number).with_default(0.0))
            .config(ConfigField::select(
                "waveform",
                "Waveform",
                &["sine", "square", "triangle", "sawtooth"],
                "sine",
            ))
            .config(ConfigField::number("frequency", "Frequency (Hz)", 1.0))
            .config(ConfigField::number("amplitude", "Amplitude", 1.0))
            .config(ConfigField::number("offset", "Offset", 0.0))
            .config(ConfigField::number("phase", "Phase", 0.0)),
    );
    registry.register(
        NodeDefinition::new(TO_FUZZY_NODE_TYPE, "To Fuzzy", "Math", to_fuzzy)
            .input(Port::data("value", "Value", PortType::Number).with_default(0.0))
            .output(Port::data("fuzzy", "Fuzzy", PortType::Fuzzy).with_default(Value::Fuzzy(0.0)))
            .config(ConfigField::number("min", "Min", 0.0))
            .config(ConfigField::number("max", "Max", 1.0)),
    );

    // ═══════════════════════════════════════════════════════════════════════
    // LOGIC
    // ═══════════════════════════════════════════════════════════════════════

    registry.register(
        NodeDefinition::new(AND_NODE_TYPE, "And", "Logic", and)
            .input(Port::data("a", "A", PortType::Boolean).with_default(false))
            .input(Port::data("b", "B", PortType::Boolean).with_default(false))
            .output(Port::data("result", "Result", PortType::Boolean).with_default(false)),
    );
    registry.register(
        NodeDefinition::new(OR_NODE_TYPE, "Or", "Logic", or)
            .input(Port::data("a", "A", PortType::Boolean).with_default(false))
            .input(Port::data("b", "B", PortType::Boolean).with_default(false))
            .output(Port::data("result", "Result", PortType::Boolean).with_default(false)),
    );
    registry.register(
        NodeDefinition::new(NOT_NODE_TYPE, "Not", "Logic", not)
            .input(Port::data("value", "Value", PortType::Boolean).with_default(false))
            .output(Port::data("result", "Result", PortType::Boolean).with_default(true)),
    );
    registry.register(
        NodeDefinition::new(COMPARE_NODE_TYPE, "Compare", "Logic", compare)
            .input(Port::data("a", "A", PortType::Number).with_default(0.0))
            .input(Port::data("b", "B", PortType::Number).with_default(0.0))
            .output(Port::data("result", "Result", PortType::Boolean).with_default(false))
            .config(ConfigField::select(
                "operator",
                "Operator",
                &["gt", "gte", "lt", "lte", "eq", "neq"],
                "gt",
            )),
    );
    registry.register(
        NodeDefinition::new(SELECT_NODE_TYPE, "Select", "Logic", select)
            .describe("Pass one of two values depending on a condition")
            .input(Port::data("condition", "Condition", PortType::Boolean).with_default(false))
            .input(Port::data("whenTrue", "If True", PortType::Any))
            .input(Port::data("whenFalse", "If False", PortType::Any))
            .output(Port::data("value", "Value", PortType::Any)),
    );

    // ═══════════════════════════════════════════════════════════════════════
    // COLOR / ARRAY
    // ═══════════════════════════════════════════════════════════════════════

    registry.register(
        NodeDefinition::new(MIX_NODE_TYPE, "Mix", "Color", mix)
            .input(Port::data("a", "A", PortType::Color).with_default(Color::BLACK))
            .input(Port::data("b", "B", PortType::Color).with_default(Color::WHITE))
            .input(Port::data("t", "Amount", PortType::Number).with_default(0.5))
            .output(Port::data("color", "Color", PortType::Color).with_default(Color::BLACK)),
    );

    let mut pack = NodeDefinition::new(PACK_NODE_TYPE, "Pack", "Array", pack)
        .describe("Collect connected values into an array, skipping empty slots")
        .output(Port::data("array", "Array", PortType::Array).with_default(Vec::new()));
    for slot in 0..PACK_SLOTS {
        pack = pack.input(Port::data(
            format!("item{}", slot),
            format!("Item {}", slot + 1),
            PortType::Any,
        ));
    }
    registry.register(pack);

    // ═══════════════════════════════════════════════════════════════════════
    // MEDIA
    // ═══════════════════════════════════════════════════════════════════════

    registry.register(
        NodeDefinition::new(MEDIA_PLAYER_NODE_TYPE, "Media Player", "Media", media_player)
            .describe("Tracks playback of one asset; `finished` fires once per reported finish")
            .input(Port::data("play", "Play", PortType::Boolean).with_default(false))
            .output(Port::data("asset", "Asset", PortType::Asset))
            .output(Port::data("playing", "Playing", PortType::Boolean).with_default(false))
            .output(Port::data("finished", "Finished", PortType::Boolean).with_default(false))
            .config(ConfigField::string("assetId", "Asset", ""))
            .config(ConfigField::boolean("loop", "Loop", false)),
    );

    // ═══════════════════════════════════════════════════════════════════════
    // GROUP
    // ═══════════════════════════════════════════════════════════════════════

    registry.register(
        NodeDefinition::new(GATE_NODE_TYPE, "Gate", "Group", gate)
            .describe("Enables its group while `active` is true")
            .input(Port::data(GATE_ACTIVE_OUTPUT, "Active", PortType::Boolean).with_default(true))
            .with_undeclared_outputs(),
    );
    registry.register(
        NodeDefinition::new(PROXY_NODE_TYPE, "Proxy", "Group", proxy)
            .describe("Boundary port of a collapsed group")
            .input(Port::data("in", "In", PortType::Any))
            .output(Port::data("out", "Out", PortType::Any))
            .config(ConfigField::select(
                "type",
                "Type",
                &PortType::all().iter().map(|t| t.as_str()).collect::<Vec<_>>(),
                "any",
            ))
            .config(ConfigField::select(
                "direction",
                "Direction",
                &["input", "output"],
                "input",
            )),
    );

    // ═══════════════════════════════════════════════════════════════════════
    // OUTPUT
    // ═══════════════════════════════════════════════════════════════════════

    registry.register(with_target_fields(
        NodeDefinition::new(COMMAND_NODE_TYPE, "Send Command", "Output", no_outputs)
            .describe("Sends a control command each time `trigger` fires")
            .input(Port::sink("trigger", "Trigger", PortType::Any))
            .config(ConfigField::string("command", "Command", ""))
            .sink_handler(send_command),
    ));
    registry.register(with_target_fields(
        NodeDefinition::new(LIGHT_NODE_TYPE, "Light", "Output", no_outputs)
            .describe("Sets client lights to `color` scaled by `intensity`")
            .input(Port::sink("color", "Color", PortType::Color))
            .input(Port::data("intensity", "Intensity", PortType::Number).with_default(1.0))
            .sink_handler(set_light),
    ));
}

fn with_target_fields(definition: NodeDefinition) -> NodeDefinition {
    definition
        .config(ConfigField::select(
            "mode",
            "Target",
            &["all", "clientIds", "group"],
            "all",
        ))
        .config(ConfigField::string("clientIds", "Client Ids", ""))
        .config(ConfigField::string("groupId", "Group", ""))
}

fn target(config: &ConfigValues) -> TargetSelector {
    TargetSelector::from_config(
        config.string("mode"),
        config.string("clientIds"),
        config.string("groupId"),
    )
}

// ═══════════════════════════════════════════════════════════════════════════
// Compute functions
// ═══════════════════════════════════════════════════════════════════════════

fn single(port: &str, value: impl Into<Value>) -> PortValues {
    PortValues::from([(port.to_string(), value.into())])
}

fn number(inputs: &PortValues, port: &str) -> f64 {
    inputs.get(port).and_then(Value::as_number).unwrap_or(0.0)
}

fn boolean(inputs: &PortValues, port: &str) -> bool {
    inputs.get(port).is_some_and(Value::is_truthy)
}

/// Guard against NaN and infinities leaking into client payloads.
fn finite(n: f64) -> f64 {
    if n.is_finite() {
        n
    } else {
        0.0
    }
}

fn number_constant(_: &PortValues, config: &ConfigValues, _: &NodeContext<'_>) -> PortValues {
    single("value", config.number("value"))
}

fn boolean_constant(_: &PortValues, config: &ConfigValues, _: &NodeContext<'_>) -> PortValues {
    single("value", config.boolean("value"))
}

fn string_constant(_: &PortValues, config: &ConfigValues, _: &NodeContext<'_>) -> PortValues {
    single("value", config.string("value"))
}

fn color_constant(_: &PortValues, config: &ConfigValues, _: &NodeContext<'_>) -> PortValues {
    single(
        "value",
        Color::from_hex(config.string("value")).unwrap_or(Color::WHITE),
    )
}

fn tick_time(_: &PortValues, _: &ConfigValues, ctx: &NodeContext<'_>) -> PortValues {
    PortValues::from([
        ("time".to_string(), Value::Number(ctx.time())),
        ("delta".to_string(), Value::Number(ctx.delta_time())),
    ])
}

fn binary_op(inputs: &PortValues, config: &ConfigValues, _: &NodeContext<'_>) -> PortValues {
    let (a, b) = (number(inputs, "a"), number(inputs, "b"));
    let result = match config.string("operation") {
        "subtract" => a - b,
        "multiply" => a * b,
        "divide" if b == 0.0 => 0.0,
        "divide" => a / b,
        "modulo" if b == 0.0 => 0.0,
        "modulo" => a.rem_euclid(b),
        "min" => a.min(b),
        "max" => a.max(b),
        "power" => a.powf(b),
        _ => a + b,
    };
    single("result", finite(result))
}

fn clamp(inputs: &PortValues, config: &ConfigValues, _: &NodeContext<'_>) -> PortValues {
    let (lo, hi) = ordered(config.number("min"), config.number("max"));
    single("result", number(inputs, "value").clamp(lo, hi))
}

fn ordered(a: f64, b: f64) -> (f64, f64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn map_range(inputs: &PortValues, config: &ConfigValues, _: &NodeContext<'_>) -> PortValues {
    let value = number(inputs, "value");
    let (in_min, in_max) = (config.number("inMin"), config.number("inMax"));
    let (out_min, out_max) = (config.number("outMin"), config.number("outMax"));

    if in_max == in_min {
        return single("result", out_min);
    }
    let mut t = (value - in_min) / (in_max - in_min);
    if config.boolean("clamp") {
        t = t.clamp(0.0, 1.0);
    }
    single("result", finite(out_min + t * (out_max - out_min)))
}

fn oscillator(_: &PortValues, config: &ConfigValues, ctx: &NodeContext<'_>) -> PortValues {
    let cycles = ctx.time() * config.number("frequency") + config.number("phase");
    let fraction = cycles - cycles.floor();
    let wave = match config.string("waveform") {
        "square" => {
            if fraction < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
        "triangle" => 4.0 * (fraction - 0.5).abs() - 1.0,
        "sawtooth" => 2.0 * fraction - 1.0,
        _ => (TAU * cycles).sin(),
    };
    single(
        "value",
        finite(config.number("offset") + config.number("amplitude") * wave),
    )
}

fn to_fuzzy(inputs: &PortValues, config: &ConfigValues, _: &NodeContext<'_>) -> PortValues {
    let (min, max) = (config.number("min"), config.number("max"));
    let truth = if max == min {
        0.0
    } else {
        ((number(inputs, "value") - min) / (max - min)).clamp(0.0, 1.0)
    };
    single("fuzzy", Value::Fuzzy(finite(truth)))
}

fn and(inputs: &PortValues, _: &ConfigValues, _: &NodeContext<'_>) -> PortValues {
    single("result", boolean(inputs, "a") && boolean(inputs, "b"))
}

fn or(inputs: &PortValues, _: &ConfigValues, _: &NodeContext<'_>) -> PortValues {
    single("result", boolean(inputs, "a") || boolean(inputs, "b"))
}

fn not(inputs: &PortValues, _: &ConfigValues, _: &NodeContext<'_>) -> PortValues {
    single("result", !boolean(inputs, "value"))
}

fn compare(inputs: &PortValues, config: &ConfigValues, _: &NodeContext<'_>) -> PortValues {
    const EPSILON: f64 = 1e-9;
    let (a, b) = (number(inputs, "a"), number(inputs, "b"));
    let result = match config.string("operator") {
        "gte" => a >= b,
        "lt" => a < b,
        "lte" => a <= b,
        "eq" => (a - b).abs() < EPSILON,
        "neq" => (a - b).abs() >= EPSILON,
        _ => a > b,
    };
    single("result", result)
}

fn select(inputs: &PortValues, _: &ConfigValues, _: &NodeContext<'_>) -> PortValues {
    let port = if boolean(inputs, "condition") {
        "whenTrue"
    } else {
        "whenFalse"
    };
    single("value", inputs.get(port).cloned().unwrap_or_default())
}

fn mix(inputs: &PortValues, _: &ConfigValues, _: &NodeContext<'_>) -> PortValues {
    let a = inputs.get("a").and_then(Value::as_color).unwrap_or(Color::BLACK);
    let b = inputs.get("b").and_then(Value::as_color).unwrap_or(Color::WHITE);
    single("color", a.lerp(&b, number(inputs, "t")))
}

fn pack(inputs: &PortValues, _: &ConfigValues, _: &NodeContext<'_>) -> PortValues {
    let items: Vec<Value> = (0..PACK_SLOTS)
        .filter_map(|slot| inputs.get(&format!("item{}", slot)))
        .filter(|value| !value.is_none())
        .cloned()
        .collect();
    single("array", items)
}

/// Consumes this node's finish pulse, so `finished` is true on exactly one tick per
/// reported finish.
fn media_player(inputs: &PortValues, config: &ConfigValues, ctx: &NodeContext<'_>) -> PortValues {
    let finished = ctx.consume_finish_pulse();
    let requested = boolean(inputs, "play");
    let playing = requested && (config.boolean("loop") || !finished);
    let asset = match config.string("assetId").trim() {
        "" => Value::None,
        id => Value::Asset(id.to_string()),
    };
    PortValues::from([
        ("asset".to_string(), asset),
        ("playing".to_string(), Value::Boolean(playing)),
        ("finished".to_string(), Value::Boolean(finished)),
    ])
}

fn gate(inputs: &PortValues, _: &ConfigValues, _: &NodeContext<'_>) -> PortValues {
    single(GATE_ACTIVE_OUTPUT, boolean(inputs, GATE_ACTIVE_OUTPUT))
}

fn proxy(inputs: &PortValues, _: &ConfigValues, _: &NodeContext<'_>) -> PortValues {
    single("out", inputs.get("in").cloned().unwrap_or_default())
}

fn no_outputs(_: &PortValues, _: &ConfigValues, _: &NodeContext<'_>) -> PortValues {
    PortValues::new()
}

// ═══════════════════════════════════════════════════════════════════════════
// Sink handlers
// ═══════════════════════════════════════════════════════════════════════════

fn send_command(
    inputs: &PortValues,
    config: &ConfigValues,
    ctx: &mut SinkContext<'_>,
) -> Result<(), SinkError> {
    let command = config.string("command").trim();
    if command.is_empty() {
        return Err(SinkError::new("no command configured"));
    }
    let value = inputs.get("trigger").map(Value::to_json).unwrap_or_default();
    ctx.emit(
        target(config),
        Value::Command(json!({ "action": command, "value": value })),
    );
    Ok(())
}

fn set_light(
    inputs: &PortValues,
    config: &ConfigValues,
    ctx: &mut SinkContext<'_>,
) -> Result<(), SinkError> {
    let color = inputs
        .get("color")
        .and_then(Value::as_color)
        .ok_or_else(|| SinkError::new("light color is not a color value"))?;
    let intensity = finite(number(inputs, "intensity")).clamp(0.0, 1.0);
    ctx.emit(
        target(config),
        Value::Command(json!({
            "action": "light",
            "color": color.scaled(intensity).to_hex(),
            "intensity": intensity,
        })),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphState, NodeInstance};
    use crate::interpreter::{execute_tick, TickContext, TickReport};
    use crate::pulses::FinishPulses;

    fn run(def: &str, inputs: PortValues, config: serde_json::Value, time: f64) -> PortValues {
        let registry = NodeRegistry::with_builtins();
        let definition = registry.get(def).unwrap();
        let raw = config.as_object().cloned().unwrap_or_default();
        let (config, issues) = ConfigValues::resolve(&definition.config_schema, &raw);
        assert!(issues.is_empty(), "{:?}", issues);
        let tick = TickContext::new(time, 0.0);
        let pulses = FinishPulses::with_system_clock();
        let ctx = NodeContext::new(&tick, "n", &pulses);
        (definition.compute)(&inputs, &config, &ctx)
    }

    fn numbers(a: f64, b: f64) -> PortValues {
        PortValues::from([
            ("a".to_string(), Value::Number(a)),
            ("b".to_string(), Value::Number(b)),
        ])
    }

    fn approx(value: &Value, expected: f64) -> bool {
        value.as_number().is_some_and(|n| (n - expected).abs() < 1e-9)
    }

    #[test]
    fn test_catalog_categories() {
        let registry = NodeRegistry::with_builtins();
        let categories: Vec<_> = registry
            .list_by_category()
            .into_iter()
            .map(|group| group.category)
            .collect();
        assert_eq!(
            categories,
            vec!["Input", "Math", "Logic", "Color", "Array", "Media", "Group", "Output"]
        );
        assert!(registry.get(GATE_NODE_TYPE).unwrap().exposes_undeclared_outputs);
        assert!(!registry.get(PROXY_NODE_TYPE).unwrap().exposes_undeclared_outputs);
    }

    #[test]
    fn test_builtin_port_ids_are_unique() {
        for definition in NodeRegistry::with_builtins().list() {
            for ports in [&definition.inputs, &definition.outputs] {
                let mut ids: Vec<_> = ports.iter().map(|p| p.id.as_str()).collect();
                ids.sort_unstable();
                ids.dedup();
                assert_eq!(ids.len(), ports.len(), "{}", definition.node_type);
            }
        }
    }

    #[test]
    fn test_binary_operations() {
        let cases = [
            ("add", 7.0),
            ("subtract", 3.0),
            ("multiply", 10.0),
            ("divide", 2.5),
            ("modulo", 1.0),
            ("min", 2.0),
            ("max", 5.0),
            ("power", 25.0),
        ];
        for (operation, expected) in cases {
            let out = run(BINARY_NODE_TYPE, numbers(5.0, 2.0), json!({"operation": operation}), 0.0);
            assert!(approx(&out["result"], expected), "{}", operation);
        }
        let out = run(BINARY_NODE_TYPE, numbers(5.0, 0.0), json!({"operation": "divide"}), 0.0);
        assert_eq!(out["result"], Value::Number(0.0));
    }

    #[test]
    fn test_map_range_and_clamp() {
        let input = PortValues::from([("value".to_string(), Value::Number(5.0))]);
        let out = run(
            MAP_RANGE_NODE_TYPE,
            input.clone(),
            json!({"inMin": 0, "inMax": 10, "outMin": 0, "outMax": 255}),
            0.0,
        );
        assert!(approx(&out["result"], 127.5));

        let out = run(CLAMP_NODE_TYPE, input.clone(), json!({"min": 10, "max": 0}), 0.0);
        assert_eq!(out["result"], Value::Number(5.0));

        let out = run(MAP_RANGE_NODE_TYPE, input, json!({"inMin": 2, "inMax": 2, "outMin": 9}), 0.0);
        assert_eq!(out["result"], Value::Number(9.0));
    }

    #[test]
    fn test_oscillator_follows_time() {
        let out = run(OSCILLATOR_NODE_TYPE, PortValues::new(), json!({}), 0.25);
        assert!(approx(&out["value"], 1.0));
        let out = run(
            OSCILLATOR_NODE_TYPE,
            PortValues::new(),
            json!({"waveform": "square", "frequency": 2}),
            0.3,
        );
        assert_eq!(out["value"], Value::Number(-1.0));
        let out = run(
            OSCILLATOR_NODE_TYPE,
            PortValues::new(),
            json!({"waveform": "sawtooth", "amplitude": 0.5, "offset": 0.5}),
            0.5,
        );
        assert!(approx(&out["value"], 0.5));
    }

    #[test]
    fn test_logic_nodes() {
        let out = run(COMPARE_NODE_TYPE, numbers(1.0, 1.0), json!({"operator": "eq"}), 0.0);
        assert_eq!(out["result"], Value::Boolean(true));
        let out = run(COMPARE_NODE_TYPE, numbers(1.0, 2.0), json!({}), 0.0);
        assert_eq!(out["result"], Value::Boolean(false));

        let inputs = PortValues::from([
            ("condition".to_string(), Value::Boolean(true)),
            ("whenTrue".to_string(), Value::from("on")),
            ("whenFalse".to_string(), Value::from("off")),
        ]);
        let out = run(SELECT_NODE_TYPE, inputs, json!({}), 0.0);
        assert_eq!(out["value"], Value::from("on"));

        let out = run(NOT_NODE_TYPE, PortValues::new(), json!({}), 0.0);
        assert_eq!(out["result"], Value::Boolean(true));
    }

    #[test]
    fn test_mix_pack_and_fuzzy() {
        let out = run(MIX_NODE_TYPE, PortValues::new(), json!({}), 0.0);
        assert_eq!(out["color"], Value::Color(Color::new(128, 128, 128)));

        let inputs = PortValues::from([
            ("item0".to_string(), Value::Number(1.0)),
            ("item1".to_string(), Value::None),
            ("item3".to_string(), Value::from("x")),
        ]);
        let out = run(PACK_NODE_TYPE, inputs, json!({}), 0.0);
        assert_eq!(
            out["array"],
            Value::Array(vec![Value::Number(1.0), Value::from("x")])
        );

        let inputs = PortValues::from([("value".to_string(), Value::Number(150.0))]);
        let out = run(TO_FUZZY_NODE_TYPE, inputs, json!({"min": 100, "max": 200}), 0.0);
        assert_eq!(out["fuzzy"], Value::Fuzzy(0.5));
    }

    #[test]
    fn test_color_input_rejects_bad_hex() {
        let out = run(COLOR_NODE_TYPE, PortValues::new(), json!({"value": "#ff0000"}), 0.0);
        assert_eq!(out["value"], Value::Color(Color::new(255, 0, 0)));
        let out = run(COLOR_NODE_TYPE, PortValues::new(), json!({"value": "red"}), 0.0);
        assert_eq!(out["value"], Value::Color(Color::WHITE));
    }

    fn show() -> GraphState {
        let mut graph = GraphState::new();
        graph
            .add_node(NodeInstance::new("play", BOOLEAN_NODE_TYPE).with_config("value", true))
            .unwrap();
        graph
            .add_node(NodeInstance::new("clip", MEDIA_PLAYER_NODE_TYPE).with_config("assetId", "intro"))
            .unwrap();
        graph
            .add_node(
                NodeInstance::new("cue", COMMAND_NODE_TYPE)
                    .with_config("command", "nextScene")
                    .with_config("mode", "group")
                    .with_config("groupId", "screens"),
            )
            .unwrap();
        graph.connect("play", "value", "clip", "play").unwrap();
        graph.connect("clip", "finished", "cue", "trigger").unwrap();
        graph
    }

    fn tick(graph: &mut GraphState, pulses: &FinishPulses) -> TickReport {
        let registry = NodeRegistry::with_builtins();
        execute_tick(graph, &registry, &TickContext::new(0.0, 0.0), pulses)
    }

    #[test]
    fn test_media_finish_fires_command_once() {
        let mut graph = show();
        let pulses = FinishPulses::with_system_clock();

        let report = tick(&mut graph, &pulses);
        assert!(report.dispatches.is_empty());
        assert_eq!(
            graph.get_node("clip").unwrap().output_values["playing"],
            Value::Boolean(true)
        );

        pulses.report_finish("clip");
        let report = tick(&mut graph, &pulses);
        assert!(!report.has_errors(), "{:?}", report.errors);
        assert_eq!(report.dispatches.len(), 1);
        let dispatch = &report.dispatches[0];
        assert_eq!(dispatch.node_id, "cue");
        assert_eq!(
            dispatch.target,
            TargetSelector::Group {
                group_id: "screens".into()
            }
        );
        assert_eq!(
            dispatch.payload,
            Value::Command(json!({"action": "nextScene", "value": true}))
        );
        assert_eq!(
            graph.get_node("clip").unwrap().output_values["playing"],
            Value::Boolean(false)
        );

        let report = tick(&mut graph, &pulses);
        assert!(report.dispatches.is_empty());
    }

    #[test]
    fn test_command_without_name_reports_sink_error() {
        let mut graph = show();
        graph.get_node_mut("cue").unwrap().config.remove("command");
        let pulses = FinishPulses::with_system_clock();
        pulses.report_finish("clip");

        let report = tick(&mut graph, &pulses);
        assert!(report.dispatches.is_empty());
        assert!(matches!(
            &report.errors[..],
            [crate::error::EngineError::SinkHandler { node_id, .. }] if node_id == "cue"
        ));
    }

    #[test]
    fn test_light_scales_color() {
        let mut graph = GraphState::new();
        graph
            .add_node(NodeInstance::new("red", COLOR_NODE_TYPE).with_config("value", "#ff0000"))
            .unwrap();
        graph
            .add_node(NodeInstance::new("half", NUMBER_NODE_TYPE).with_config("value", 0.5))
            .unwrap();
        graph
            .add_node(
                NodeInstance::new("wash", LIGHT_NODE_TYPE)
                    .with_config("mode", "clientIds")
                    .with_config("clientIds", "a,b"),
            )
            .unwrap();
        graph.connect("red", "value", "wash", "color").unwrap();
        graph.connect("half", "value", "wash", "intensity").unwrap();

        let report = tick(&mut graph, &FinishPulses::with_system_clock());
        assert_eq!(report.dispatches.len(), 1);
        assert_eq!(
            report.dispatches[0].payload,
            Value::Command(json!({"action": "light", "color": "#800000", "intensity": 0.5}))
        );
    }

    #[test]
    fn test_gate_active_is_consumable_downstream() {
        let mut graph = GraphState::new();
        graph
            .add_node(NodeInstance::new("off", BOOLEAN_NODE_TYPE))
            .unwrap();
        graph.add_node(NodeInstance::new("gate", GATE_NODE_TYPE)).unwrap();
        graph.add_node(NodeInstance::new("inv", NOT_NODE_TYPE)).unwrap();
        graph.connect("off", "value", "gate", "active").unwrap();
        graph.connect("gate", "active", "inv", "value").unwrap();

        let report = tick(&mut graph, &FinishPulses::with_system_clock());
        assert!(!report.has_errors(), "{:?}", report.errors);
        assert_eq!(
            graph.get_node("gate").unwrap().output_values[GATE_ACTIVE_OUTPUT],
            Value::Boolean(false)
        );
        assert_eq!(
            graph.get_node("inv").unwrap().output_values["result"],
            Value::Boolean(true)
        );
    }

    #[test]
    fn test_proxy_is_identity_for_any_type() {
        let input = PortValues::from([("in".to_string(), Value::Scene("finale".into()))]);
        let out = run(PROXY_NODE_TYPE, input, json!({"type": "number", "direction": "output"}), 0.0);
        assert_eq!(out["out"], Value::Scene("finale".into()));
    }
}
