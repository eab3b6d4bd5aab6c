//! Weakly typed field decoders: a config author may write a port or a
//! boolean as either its native type or a quoted string, and numeric
//! 0/1 stands in for a bool too. Each function here is a `deserialize_with`
//! target for exactly that leniency.

use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum NumOrStr {
	Num(u16),
	Str(String),
}

pub fn u16<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
	D: Deserializer<'de>,
{
	match NumOrStr::deserialize(deserializer)? {
		NumOrStr::Num(n) => Ok(n),
		NumOrStr::Str(s) => s.parse().map_err(serde::de::Error::custom),
	}
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoolLike {
	Bool(bool),
	Num(i64),
	Str(String),
}

pub fn bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
	D: Deserializer<'de>,
{
	match BoolLike::deserialize(deserializer)? {
		BoolLike::Bool(b) => Ok(b),
		BoolLike::Num(n) => Ok(n != 0),
		BoolLike::Str(s) => match s.as_str() {
			"true" | "1" => Ok(true),
			"false" | "0" => Ok(false),
			other => other.parse().map_err(serde::de::Error::custom),
		},
	}
}

#[cfg(test)]
mod tests {
	use serde::Deserialize;

	#[derive(Deserialize)]
	struct Port {
		#[serde(deserialize_with = "super::u16")]
		port: u16,
	}

	#[derive(Deserialize)]
	struct Flag {
		#[serde(deserialize_with = "super::bool")]
		flag: bool,
	}

	#[test]
	fn accepts_a_quoted_port() {
		let v: Port = serde_yaml::from_str("port: \"8080\"").unwrap();
		assert_eq!(v.port, 8080);
	}

	#[test]
	fn accepts_a_bare_port() {
		let v: Port = serde_yaml::from_str("port: 8080").unwrap();
		assert_eq!(v.port, 8080);
	}

	#[test]
	fn accepts_numeric_and_string_bools() {
		let v: Flag = serde_yaml::from_str("flag: 1").unwrap();
		assert!(v.flag);
		let v: Flag = serde_yaml::from_str("flag: \"false\"").unwrap();
		assert!(!v.flag);
		let v: Flag = serde_yaml::from_str("flag: true").unwrap();
		assert!(v.flag);
	}
}
