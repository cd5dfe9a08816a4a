pub mod batch;
pub mod carpet;
pub mod path;
pub mod query;

use anyhow::{bail, Context, Result};
use elevq::Coordinate;

/// Parse a `"lat,lon"` argument.
pub fn parse_point(value: &str) -> Result<Coordinate> {
    let Some((lat, lon)) = value.split_once(',') else {
        bail!("Expected \"lat,lon\", got {value:?}");
    };
    let lat: f64 = lat
        .trim()
        .parse()
        .with_context(|| format!("Invalid latitude in {value:?}"))?;
    let lon: f64 = lon
        .trim()
        .parse()
        .with_context(|| format!("Invalid longitude in {value:?}"))?;
    Ok(Coordinate::new(lat, lon))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_point() {
        assert_eq!(
            parse_point("46.55, 7.98").unwrap(),
            Coordinate::new(46.55, 7.98)
        );
        assert!(parse_point("46.55").is_err());
        assert!(parse_point("north,7.98").is_err());
    }
}
