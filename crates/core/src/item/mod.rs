mod codec;
mod error;
mod key;
mod value;

pub use codec::{
    decode_item, encode_item, item_from_json, item_to_json, parse_number, value_from_json,
    value_to_json,
};
pub use error::{CodecError, KeyError, Result};
pub use key::{KeySchema, PrimaryKey};
pub use value::{Item, Value};
