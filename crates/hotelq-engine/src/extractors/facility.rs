use async_trait::async_trait;
use serde_json::json;

use hotelq_core::{fields, Context, ExtractError, Extractor, PartialState};

/// What a vocabulary term maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Amenity {
    Hotel(i64),
    Room(i64),
    /// A lodging type such as `homestay` or `hot_spring`.
    Kind(String),
}

const OWNED: &[&str] =
    &[fields::HOTEL_FACILITY_IDS, fields::ROOM_FACILITY_IDS, fields::HOTEL_TYPES];

/// Facility and lodging-type words mapped through a configurable vocabulary.
/// Terms are matched as lowercase substrings.
#[derive(Debug, Clone)]
pub struct FacilityExtractor {
    vocabulary: Vec<(String, Amenity)>,
}

impl Default for FacilityExtractor {
    fn default() -> Self {
        use Amenity::{Hotel, Kind, Room};
        let kind = |k: &str| Kind(k.to_string());
        Self::new([
            ("停車", Hotel(1)),
            ("parking", Hotel(1)),
            ("游泳池", Hotel(2)),
            ("泳池", Hotel(2)),
            ("pool", Hotel(2)),
            ("健身", Hotel(3)),
            ("gym", Hotel(3)),
            ("無障礙", Hotel(4)),
            ("wheelchair", Hotel(4)),
            ("洗衣", Hotel(5)),
            ("laundry", Hotel(5)),
            ("寵物", Hotel(6)),
            ("pet", Hotel(6)),
            ("wifi", Room(101)),
            ("無線網路", Room(101)),
            ("浴缸", Room(102)),
            ("bathtub", Room(102)),
            ("陽台", Room(103)),
            ("balcony", Room(103)),
            ("廚房", Room(104)),
            ("kitchen", Room(104)),
            ("民宿", kind("homestay")),
            ("homestay", kind("homestay")),
            ("度假村", kind("resort")),
            ("resort", kind("resort")),
            ("溫泉", kind("hot_spring")),
            ("泡湯", kind("hot_spring")),
            ("hot spring", kind("hot_spring")),
            ("露營", kind("camping")),
            ("glamping", kind("camping")),
        ])
    }
}

impl FacilityExtractor {
    pub fn new<S: Into<String>>(vocabulary: impl IntoIterator<Item = (S, Amenity)>) -> Self {
        let vocabulary =
            vocabulary.into_iter().map(|(term, a)| (term.into().to_lowercase(), a)).collect();
        Self { vocabulary }
    }
}

#[async_trait]
impl Extractor for FacilityExtractor {
    fn name(&self) -> &str {
        "facility"
    }

    fn owned_fields(&self) -> &[&str] {
        OWNED
    }

    fn default_output(&self) -> PartialState {
        PartialState::new()
    }

    async fn extract(&self, query: &str, _context: &Context) -> Result<PartialState, ExtractError> {
        let text = query.to_lowercase();
        let (mut hotel, mut room, mut kinds) = (Vec::new(), Vec::new(), Vec::new());
        for (term, amenity) in &self.vocabulary {
            if !text.contains(term.as_str()) {
                continue;
            }
            match amenity {
                Amenity::Hotel(id) => hotel.push(*id),
                Amenity::Room(id) => room.push(*id),
                Amenity::Kind(k) => kinds.push(k.clone()),
            }
        }

        let mut out = PartialState::new();
        if !hotel.is_empty() {
            out.insert(fields::HOTEL_FACILITY_IDS, json!(hotel));
        }
        if !room.is_empty() {
            out.insert(fields::ROOM_FACILITY_IDS, json!(room));
        }
        if !kinds.is_empty() {
            out.insert(fields::HOTEL_TYPES, json!(kinds));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn maps_terms_to_ids_and_kinds() {
        let out = FacilityExtractor::default()
            .extract("有停車場和WiFi的溫泉民宿", &Context::new())
            .await
            .unwrap();
        assert_eq!(out.get(fields::HOTEL_FACILITY_IDS), Some(&json!([1])));
        assert_eq!(out.get(fields::ROOM_FACILITY_IDS), Some(&json!([101])));
        assert_eq!(out.get(fields::HOTEL_TYPES), Some(&json!(["homestay", "hot_spring"])));
    }

    #[tokio::test]
    async fn custom_vocabulary() {
        let extractor = FacilityExtractor::new([("Sauna", Amenity::Hotel(42))]);
        let out = extractor.extract("need a sauna", &Context::new()).await.unwrap();
        assert_eq!(out.get(fields::HOTEL_FACILITY_IDS), Some(&json!([42])));
        assert!(extractor.extract("停車", &Context::new()).await.unwrap().is_empty());
    }
}
