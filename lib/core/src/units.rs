// Offline unit conversion for common SI and electrical units
use crate::capability::{CapabilityResult, UnitConverter};
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dimension {
    Length,
    Area,
    Voltage,
    Current,
    Mass,
    Power,
}

/// Table-driven [`UnitConverter`]. Latin and Cyrillic spellings are
/// accepted, superscripts are folded (`мм²` == `мм2`). Unknown units and
/// cross-dimension pairs return the value unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticUnitConverter;

impl StaticUnitConverter {
    pub fn new() -> Self {
        Self
    }

    fn normalize(unit: &str) -> String {
        unit.trim()
            .to_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '.')
            .map(|c| match c {
                '²' => '2',
                '³' => '3',
                other => other,
            })
            .collect()
    }

    /// Dimension and factor relative to the dimension's smallest listed unit
    fn lookup(unit: &str) -> Option<(Dimension, f64)> {
        use Dimension::*;
        let entry = match Self::normalize(unit).as_str() {
            "mm" | "мм" => (Length, 1.0),
            "cm" | "см" => (Length, 10.0),
            "m" | "м" => (Length, 1e3),
            "km" | "км" => (Length, 1e6),
            "mm2" | "мм2" | "sqmm" => (Area, 1.0),
            "cm2" | "см2" => (Area, 1e2),
            "m2" | "м2" => (Area, 1e6),
            "v" | "в" => (Voltage, 1.0),
            "kv" | "кв" => (Voltage, 1e3),
            "ma" | "ма" => (Current, 1.0),
            "a" | "а" => (Current, 1e3),
            "ka" | "ка" => (Current, 1e6),
            "g" | "г" => (Mass, 1.0),
            "kg" | "кг" => (Mass, 1e3),
            "t" | "т" => (Mass, 1e6),
            "w" | "вт" => (Power, 1.0),
            "kw" | "квт" => (Power, 1e3),
            _ => return None,
        };
        Some(entry)
    }

    /// Synchronous conversion; `None` when the pair cannot be resolved
    pub fn try_convert(&self, value: f64, from_unit: &str, to_unit: &str) -> Option<f64> {
        let (from_dim, from_factor) = Self::lookup(from_unit)?;
        let (to_dim, to_factor) = Self::lookup(to_unit)?;
        if from_dim != to_dim {
            return None;
        }
        if from_factor == to_factor {
            return Some(value);
        }
        Some(value * from_factor / to_factor)
    }
}

#[async_trait]
impl UnitConverter for StaticUnitConverter {
    async fn convert(
        &self,
        value: f64,
        from_unit: Option<&str>,
        to_unit: Option<&str>,
    ) -> CapabilityResult<f64> {
        let (Some(from), Some(to)) = (from_unit, to_unit) else {
            return Ok(value);
        };
        Ok(self.try_convert(value, from, to).unwrap_or(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_dimension() {
        let c = StaticUnitConverter::new();
        assert_eq!(c.try_convert(2.5, "мм²", "mm2"), Some(2.5));
        assert_eq!(c.try_convert(1.0, "кВ", "В"), Some(1000.0));
        assert_eq!(c.try_convert(450.0, "V", "kV"), Some(0.45));
        assert_eq!(c.try_convert(250.0, "г", "кг"), Some(0.25));
    }

    #[test]
    fn test_unresolvable() {
        let c = StaticUnitConverter::new();
        assert_eq!(c.try_convert(1.0, "мм", "В"), None);
        assert_eq!(c.try_convert(1.0, "попугай", "мм"), None);
    }

    #[tokio::test]
    async fn test_capability_falls_back_to_input() {
        let c = StaticUnitConverter::new();
        assert_eq!(c.convert(3.0, None, Some("мм")).await.unwrap(), 3.0);
        assert_eq!(c.convert(3.0, Some("мм"), None).await.unwrap(), 3.0);
        assert_eq!(c.convert(3.0, Some("мм"), Some("В")).await.unwrap(), 3.0);
        assert_eq!(c.convert(3.0, Some("см"), Some("мм")).await.unwrap(), 30.0);
    }
}
