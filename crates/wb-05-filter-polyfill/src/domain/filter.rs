//! Log filter parameters and block tags.

use super::error::FilterError;
use serde::Serialize;
use serde_json::{json, Map, Value};
use shared_types::{parse_hex_u64, to_hex_u64};

/// Resolved block parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    Latest,
    Number(u64),
}

impl BlockTag {
    /// Parse `fromBlock`/`toBlock`. Absent, `latest` and `pending` mean
    /// latest; `earliest` is block 0.
    pub fn parse(value: Option<&Value>) -> Result<Self, FilterError> {
        match value {
            None | Some(Value::Null) => Ok(BlockTag::Latest),
            Some(Value::String(s)) => match s.as_str() {
                "latest" | "pending" => Ok(BlockTag::Latest),
                "earliest" => Ok(BlockTag::Number(0)),
                hex => parse_hex_u64(hex)
                    .map(BlockTag::Number)
                    .ok_or_else(|| invalid_block(value)),
            },
            Some(_) => Err(invalid_block(value)),
        }
    }

    pub fn number(&self) -> Option<u64> {
        match self {
            BlockTag::Latest => None,
            BlockTag::Number(n) => Some(*n),
        }
    }

    fn to_value(self) -> Value {
        match self {
            BlockTag::Latest => json!("latest"),
            BlockTag::Number(n) => json!(to_hex_u64(n)),
        }
    }
}

fn invalid_block(value: Option<&Value>) -> FilterError {
    let shown = value.map(Value::to_string).unwrap_or_else(|| "undefined".into());
    FilterError::InvalidParams(format!("Invalid block option: {}", shown))
}

/// A log filter as installed by `eth_newFilter`.
#[derive(Debug, Clone, PartialEq)]
pub struct LogFilter {
    pub from_block: BlockTag,
    pub to_block: BlockTag,
    /// `None` matches every address
    pub addresses: Option<Vec<String>>,
    pub topics: Vec<Value>,
}

impl LogFilter {
    /// Parse the `eth_newFilter` parameter object.
    pub fn from_param(param: &Value) -> Result<Self, FilterError> {
        let addresses = match param.get("address") {
            None | Some(Value::Null) => None,
            Some(Value::String(address)) => Some(vec![address.clone()]),
            Some(Value::Array(list)) => Some(
                list.iter()
                    .map(|a| {
                        a.as_str().map(str::to_string).ok_or_else(|| {
                            FilterError::InvalidParams(format!("Invalid address: {}", a))
                        })
                    })
                    .collect::<Result<_, _>>()?,
            ),
            Some(other) => {
                return Err(FilterError::InvalidParams(format!(
                    "Invalid address: {}",
                    other
                )))
            }
        };
        let topics = match param.get("topics") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(topics)) => topics.clone(),
            Some(other) => {
                return Err(FilterError::InvalidParams(format!(
                    "Invalid topics: {}",
                    other
                )))
            }
        };

        Ok(Self {
            from_block: BlockTag::parse(param.get("fromBlock"))?,
            to_block: BlockTag::parse(param.get("toBlock"))?,
            addresses,
            topics,
        })
    }

    /// `eth_getLogs` parameter for this filter.
    pub fn to_param(&self) -> Value {
        self.range_param(self.from_block, self.to_block)
    }

    /// `eth_getLogs` parameter for an explicit block range.
    pub fn range_param(&self, from: BlockTag, to: BlockTag) -> Value {
        let mut param = Map::new();
        param.insert("fromBlock".into(), from.to_value());
        param.insert("toBlock".into(), to.to_value());
        param.insert("topics".into(), Value::Array(self.topics.clone()));
        if let Some(addresses) = &self.addresses {
            param.insert("address".into(), json!(addresses));
        }
        Value::Object(param)
    }
}

/// What a filter id refers to.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterKind {
    Log(LogFilter),
    Block,
    PendingTransaction,
}

impl FilterKind {
    pub fn label(&self) -> &'static str {
        match self {
            FilterKind::Log(_) => "log",
            FilterKind::Block => "block",
            FilterKind::PendingTransaction => "pending transaction",
        }
    }
}

/// Outcome of a filter query in the legacy `{result}` / `{error}` shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FilterResponse {
    #[serde(rename = "result")]
    Result(Value),
    #[serde(rename = "error")]
    Error(FilterNotFound),
}

impl FilterResponse {
    pub fn empty() -> Self {
        FilterResponse::Result(Value::Array(Vec::new()))
    }

    pub fn not_found() -> Self {
        FilterResponse::Error(FilterNotFound::default())
    }

    pub fn to_value(&self) -> Value {
        match self {
            FilterResponse::Result(result) => json!({ "result": result }),
            FilterResponse::Error(error) => json!({ "error": error }),
        }
    }
}

/// The fixed error body for unknown, uninstalled or expired filters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterNotFound {
    pub code: i32,
    pub message: &'static str,
}

impl Default for FilterNotFound {
    fn default() -> Self {
        Self {
            code: shared_types::codes::INVALID_INPUT,
            message: "filter not found",
        }
    }
}
