// System prompts and response schemas for the chat-completion capabilities
use serde_json::{json, Value};

pub const ARBITER_SYSTEM: &str = "\
You are an ontology arbiter. Given a candidate attribute label and a list of existing nodes \
(label + examples), decide:
- best_index: index into the list, or -1 if a new node is required
- relation: \"SIMILAR_TO\" or \"ALIAS_OF\" when a match is found, otherwise \"NONE\"
Return JSON: {\"best_index\": int, \"relation\": \"SIMILAR_TO|ALIAS_OF|NONE\"}";

pub const EXTRACT_SYSTEM: &str = "\
Ты извлекаешь характеристики материалов из русских названий/описаний.
Верни JSON с массивом `pairs`, каждый элемент:
{ \"name\": string, \"value\": string|number, \"unit\": string|null, \"number\": number|null }.
Если видишь `3x2.5 мм²` → {name:\"жилы\", value:3, number:3} и {name:\"сечение\", value:2.5, unit:\"мм2\", number:2.5}.
Если напряжение `450/750 В` → возьми минимум (450) как {name:\"номинальное напряжение\", unit:\"В\", number:450, value:450}.
Для отрицания `не ПВХ` → {name:\"материал оболочки\", value:\"!ПВХ\"}.
Стандарты включай как {name:\"ГОСТ/стандарт\", value:\"ГОСТ 31996-2012\"}.
Используй русские названия характеристик и значений.";

pub const PLAN_SYSTEM: &str = "\
You are a procurement assistant. Build a FILTER PLAN from a natural-language query.
Prefer numeric comparisons with units when possible. For `range` use a two-element array [low, high]. \
For `in` use an array of accepted values.
Return JSON with keys: must, must_not, should.";

pub const CONVERT_SYSTEM: &str = "\
You convert numeric values between units. Respond with
{\"ok\": true, \"value\": number, \"unit\": string} or {\"ok\": false, \"value\": null, \"unit\": null}.
Supported units: common SI and electrical (mm2, mm, m, V, A, kg, g).
If source and target are equivalent, return the same number.";

pub fn extract_schema() -> Value {
    json!({
        "name": "ExtractPairs",
        "strict": true,
        "schema": {
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "pairs": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "additionalProperties": false,
                        "properties": {
                            "name": {"type": "string"},
                            "value": {"anyOf": [{"type": "string"}, {"type": "number"}]},
                            "unit": {"anyOf": [{"type": "string"}, {"type": "null"}]},
                            "number": {"anyOf": [{"type": "number"}, {"type": "null"}]}
                        },
                        "required": ["name", "value", "unit", "number"]
                    }
                }
            },
            "required": ["pairs"]
        }
    })
}

pub fn plan_schema() -> Value {
    json!({
        "name": "FilterPlan",
        "strict": true,
        "schema": {
            "type": "object",
            "additionalProperties": false,
            "$defs": {
                "Clause": {
                    "type": "object",
                    "additionalProperties": false,
                    "properties": {
                        "attr": {"type": "string"},
                        "op": {"type": "string", "enum": ["eq", "neq", "in", "gte", "lte", "range", "contains"]},
                        "value": {
                            "anyOf": [
                                {"type": "string"},
                                {"type": "number"},
                                {"type": "array", "items": {"anyOf": [{"type": "string"}, {"type": "number"}]}}
                            ]
                        },
                        "unit": {"anyOf": [{"type": "string"}, {"type": "null"}]}
                    },
                    "required": ["attr", "op", "value", "unit"]
                }
            },
            "properties": {
                "must": {"type": "array", "items": {"$ref": "#/$defs/Clause"}},
                "must_not": {"type": "array", "items": {"$ref": "#/$defs/Clause"}},
                "should": {"type": "array", "items": {"$ref": "#/$defs/Clause"}}
            },
            "required": ["must", "must_not", "should"]
        }
    })
}

pub fn convert_schema() -> Value {
    json!({
        "name": "UnitConvert",
        "strict": true,
        "schema": {
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "ok": {"type": "boolean"},
                "value": {"anyOf": [{"type": "number"}, {"type": "null"}]},
                "unit": {"anyOf": [{"type": "string"}, {"type": "null"}]}
            },
            "required": ["ok", "value", "unit"]
        }
    })
}
