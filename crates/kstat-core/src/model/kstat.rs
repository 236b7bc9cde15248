//! The assembled statistic handed to callers.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::decode::IoFields;
use crate::model::{Field, FieldType, FieldValue, KstatHeader, KstatId, KstatType, Numeric};
use crate::sink::KstatSink;

/// Type and value of one statistic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KstatData {
    pub field_type: FieldType,
    pub value: FieldValue,
}

impl KstatData {
    pub fn is_numeric(&self) -> bool {
        matches!(self.value, FieldValue::Number(_))
    }

    /// Type a value read back from JSON is given: JSON keeps no width, so
    /// numbers become 64-bit and text becomes STRING.
    fn from_json_value(value: FieldValue) -> Self {
        let field_type = match value {
            FieldValue::Number(Numeric::Unsigned(_)) => FieldType::UInt64,
            FieldValue::Number(Numeric::Signed(_)) => FieldType::Int64,
            FieldValue::Text(_) => FieldType::String,
        };
        Self { field_type, value }
    }
}

/// Serializes statistics as a bare `name -> value` map.
mod data_values {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serializer};

    use super::KstatData;
    use crate::model::FieldValue;

    pub fn serialize<S: Serializer>(
        data: &BTreeMap<String, KstatData>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_map(data.iter().map(|(name, d)| (name, &d.value)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<String, KstatData>, D::Error> {
        let values = BTreeMap::<String, FieldValue>::deserialize(deserializer)?;
        Ok(values
            .into_iter()
            .map(|(name, value)| (name, KstatData::from_json_value(value)))
            .collect())
    }
}

/// One kstat with its metadata and decoded statistics.
///
/// `Kstat` is the default [`KstatSink`]: feed it to
/// [`Decoder::emit`](crate::decode::Decoder::emit) and it collects every
/// field. Two values are equal when they name the same kstat, regardless of
/// when they were read or what they hold.
///
/// Serializes to
/// `{"class","type","module","instance","name","crtime","snaptime","data":{..}}`
/// with `type` the numeric `ks_type`. Times and data may be absent when
/// deserializing, which is how identity-only listings read back.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Kstat {
    class: String,
    #[serde(rename = "type")]
    kstat_type: KstatType,
    #[serde(flatten)]
    id: KstatId,
    #[serde(default)]
    crtime: i64,
    #[serde(default)]
    snaptime: i64,
    #[serde(default, with = "data_values")]
    data: BTreeMap<String, KstatData>,
}

impl Kstat {
    /// An unread kstat: no class, no statistics.
    pub fn new(id: KstatId) -> Self {
        Self {
            id,
            class: String::new(),
            kstat_type: KstatType::Unknown(u8::MAX),
            crtime: 0,
            snaptime: 0,
            data: BTreeMap::new(),
        }
    }

    /// An unread kstat carrying the metadata of an enumerated header.
    pub fn from_header(header: &KstatHeader) -> Self {
        let mut ks = Self::new(header.id.clone());
        ks.class = header.class.clone();
        ks.kstat_type = header.kstat_type;
        ks.crtime = header.crtime;
        ks
    }

    pub fn id(&self) -> &KstatId {
        &self.id
    }

    pub fn module(&self) -> &str {
        &self.id.module
    }

    pub fn instance(&self) -> i32 {
        self.id.instance
    }

    pub fn name(&self) -> &str {
        &self.id.name
    }

    /// `module:instance:name`.
    pub fn triplet(&self) -> String {
        self.id.to_string()
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn kstat_type(&self) -> KstatType {
        self.kstat_type
    }

    pub fn crtime(&self) -> i64 {
        self.crtime
    }

    pub fn snaptime(&self) -> i64 {
        self.snaptime
    }

    /// Nanoseconds between creation and the snapshot.
    pub fn age(&self) -> i64 {
        self.snaptime - self.crtime
    }

    /// Statistic names in sorted order.
    pub fn statistics(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn has_statistic(&self, name: &str) -> bool {
        self.data.contains_key(name)
    }

    pub fn data(&self, name: &str) -> Option<&KstatData> {
        self.data.get(name)
    }

    pub fn value(&self, name: &str) -> Option<&FieldValue> {
        self.data.get(name).map(|d| &d.value)
    }

    /// Value of a numeric statistic; `None` if absent or text.
    pub fn numeric(&self, name: &str) -> Option<Numeric> {
        self.data.get(name).and_then(|d| d.value.as_numeric())
    }

    pub fn is_numeric(&self, name: &str) -> bool {
        self.data.get(name).is_some_and(KstatData::is_numeric)
    }

    pub fn insert(&mut self, field: Field) {
        self.data.insert(
            field.name,
            KstatData {
                field_type: field.field_type,
                value: field.value,
            },
        );
    }

    /// Chain-level metadata of this kstat.
    pub fn header(&self) -> KstatHeader {
        KstatHeader {
            id: self.id.clone(),
            class: self.class.clone(),
            kstat_type: self.kstat_type,
            crtime: self.crtime,
        }
    }

    /// JSON object of the form
    /// `{"class","type","module","instance","name","crtime","snaptime","data":{..}}`.
    ///
    /// Numeric statistics are JSON numbers, text statistics JSON strings.
    pub fn to_json(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

impl KstatSink for Kstat {
    fn begin_record(&mut self, class: &str, kstat_type: KstatType, crtime: i64, snaptime: i64) {
        self.class = class.to_string();
        self.kstat_type = kstat_type;
        self.crtime = crtime;
        self.snaptime = snaptime;
        self.data.clear();
    }

    fn add_numeric_field(&mut self, name: &str, field_type: FieldType, value: Numeric) {
        self.insert(Field::numeric(name, field_type, value));
    }

    fn add_text_field(&mut self, name: &str, field_type: FieldType, value: &str) {
        self.insert(Field::text(name, field_type, value));
    }

    fn add_io_fields(&mut self, io: &IoFields) {
        for field in io.fields() {
            self.insert(field);
        }
    }
}

impl PartialEq for Kstat {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Kstat {}

impl Hash for Kstat {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Ord for Kstat {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl PartialOrd for Kstat {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Kstat {
        let mut ks = Kstat::new(KstatId::new("unix", 0, "system_misc"));
        ks.begin_record("misc", KstatType::Named, 1_000, 5_000);
        ks.add_numeric_field("ncpus", FieldType::UInt32, Numeric::Unsigned(8));
        ks.add_numeric_field("clk_intr", FieldType::Int64, Numeric::Signed(-2));
        ks.add_text_field("zonename", FieldType::String, "global");
        ks
    }

    #[test]
    fn test_accessors() {
        let ks = sample();
        assert_eq!(ks.triplet(), "unix:0:system_misc");
        assert_eq!(ks.age(), 4_000);
        assert_eq!(ks.statistics().collect::<Vec<_>>(), vec!["clk_intr", "ncpus", "zonename"]);
        assert!(ks.has_statistic("ncpus"));
        assert!(ks.is_numeric("ncpus"));
        assert!(!ks.is_numeric("zonename"));
        assert!(!ks.is_numeric("absent"));
        assert_eq!(ks.numeric("ncpus"), Some(Numeric::Unsigned(8)));
        assert_eq!(ks.numeric("zonename"), None);
        assert_eq!(ks.value("zonename").and_then(|v| v.as_text()), Some("global"));
    }

    #[test]
    fn test_begin_record_resets_data() {
        let mut ks = sample();
        ks.begin_record("misc", KstatType::Named, 1_000, 9_000);
        assert!(ks.is_empty());
        assert_eq!(ks.snaptime(), 9_000);
    }

    #[test]
    fn test_io_fields_are_all_present() {
        let mut ks = Kstat::new(KstatId::new("sd", 0, "sd0"));
        ks.begin_record("disk", KstatType::Io, 0, 1);
        ks.add_io_fields(&IoFields {
            nread: 100,
            rtime: 7,
            ..IoFields::default()
        });
        assert_eq!(ks.len(), 12);
        assert_eq!(ks.numeric("nread"), Some(Numeric::Unsigned(100)));
        assert_eq!(ks.data("rtime").map(|d| d.field_type), Some(FieldType::Int64));
    }

    #[test]
    fn test_to_json_shape() {
        let ks = sample();
        let v = ks.to_json().unwrap();
        assert_eq!(v["class"], "misc");
        assert_eq!(v["type"], 1);
        assert_eq!(v["module"], "unix");
        assert_eq!(v["instance"], 0);
        assert_eq!(v["name"], "system_misc");
        assert_eq!(v["crtime"], 1_000);
        assert_eq!(v["snaptime"], 5_000);
        assert_eq!(v["data"]["ncpus"], 8);
        assert_eq!(v["data"]["clk_intr"], -2);
        assert_eq!(v["data"]["zonename"], "global");
    }

    #[test]
    fn test_json_reads_back() {
        let ks = sample();
        let back: Kstat = serde_json::from_value(ks.to_json().unwrap()).unwrap();
        assert_eq!(back.header(), ks.header());
        assert_eq!(back.snaptime(), 5_000);
        assert_eq!(back.numeric("ncpus"), Some(Numeric::Unsigned(8)));
        assert_eq!(back.data("ncpus").map(|d| d.field_type), Some(FieldType::UInt64));
        assert_eq!(back.numeric("clk_intr"), Some(Numeric::Signed(-2)));
        assert_eq!(back.data("clk_intr").map(|d| d.field_type), Some(FieldType::Int64));
        assert_eq!(back.data("zonename").map(|d| d.field_type), Some(FieldType::String));

        let listed: Kstat = serde_json::from_str(
            r#"{"class":"disk","type":3,"module":"sd","name":"sd0","instance":0}"#,
        )
        .unwrap();
        assert_eq!(listed.kstat_type(), KstatType::Io);
        assert_eq!(listed.crtime(), 0);
        assert!(listed.is_empty());
    }

    #[test]
    fn test_equality_is_by_identity() {
        let a = sample();
        let b = Kstat::new(KstatId::new("unix", 0, "system_misc"));
        assert_eq!(a, b);

        let mut list = vec![
            Kstat::new(KstatId::new("sd", 0, "sd10")),
            Kstat::new(KstatId::new("sd", 0, "sd9")),
            Kstat::new(KstatId::new("cpu", 1, "sys")),
        ];
        list.sort();
        let names: Vec<String> = list.iter().map(Kstat::triplet).collect();
        assert_eq!(names, vec!["cpu:1:sys", "sd:0:sd9", "sd:0:sd10"]);
    }
}
