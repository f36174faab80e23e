//! Signal K subscription path patterns
//!
//! Patterns are dot-separated. A `*` segment matches exactly one path segment,
//! except as the last segment where it matches one or more. `*` alone matches
//! every path.

/// Compiled subscription path pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    segments: Vec<String>,
}

impl PathPattern {
    pub fn new(pattern: &str) -> Self {
        Self {
            segments: pattern.split('.').map(str::to_string).collect(),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        if path.is_empty() {
            return false;
        }

        let parts: Vec<&str> = path.split('.').collect();
        let last = self.segments.len() - 1;

        for (i, segment) in self.segments.iter().enumerate() {
            let Some(part) = parts.get(i) else {
                return false;
            };
            if segment == "*" {
                if i == last {
                    return true;
                }
            } else if segment != part {
                return false;
            }
        }

        parts.len() == self.segments.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_matches_everything() {
        let pattern = PathPattern::new("*");
        assert!(pattern.matches("navigation.state"));
        assert!(pattern.matches("uuid"));
        assert!(pattern.matches("environment.wind.speedApparent"));
        assert!(!pattern.matches(""));
    }

    #[test]
    fn test_exact_pattern() {
        let pattern = PathPattern::new("navigation.speedOverGround");
        assert!(pattern.matches("navigation.speedOverGround"));
        assert!(!pattern.matches("navigation.speedThroughWater"));
        assert!(!pattern.matches("navigation"));
        assert!(!pattern.matches("navigation.speedOverGround.extra"));
    }

    #[test]
    fn test_trailing_wildcard() {
        let pattern = PathPattern::new("navigation.*");
        assert!(pattern.matches("navigation.position"));
        assert!(pattern.matches("navigation.attitude.roll"));
        assert!(!pattern.matches("navigation"));
        assert!(!pattern.matches("environment.depth"));
    }

    #[test]
    fn test_inner_wildcard_matches_one_segment() {
        let pattern = PathPattern::new("propulsion.*.revolutions");
        assert!(pattern.matches("propulsion.port.revolutions"));
        assert!(!pattern.matches("propulsion.port.oilTemperature"));
        assert!(!pattern.matches("propulsion.port.engine.revolutions"));
    }
}
