/// Color used for any industry label missing from [`INDUSTRIES`].
pub const DEFAULT_INDUSTRY_COLOR: &str = "#9E9E9E";

/// Known level-2 industry labels and their chart colors.
pub const INDUSTRIES: &[(&str, &str)] = &[
    ("Automobiles & Parts", "#5B8FF9"),
    ("Banking", "#FF6B3B"),
    ("Basic Resources", "#9270CA"),
    ("Chemicals", "#269A99"),
    ("Construction & Materials", "#FF99C3"),
    ("Financial Services", "#5D7092"),
    ("Food & Beverage", "#F6BD16"),
    ("Health Care", "#6DC8EC"),
    ("Industrial Goods & Services", "#E8684A"),
    ("Insurance", "#1E9493"),
    ("Media", "#FF9845"),
    ("Oil & Gas", "#945FB9"),
    ("Personal & Household Goods", "#5AD8A6"),
    ("Real Estate", "#D3CEFD"),
    ("Retail", "#FFC53D"),
    ("Technology", "#73D13D"),
    ("Telecommunications", "#36CFC9"),
    ("Travel & Leisure", "#F759AB"),
    ("Utilities", "#597EF7"),
];

pub fn all_industries() -> Vec<String> {
    INDUSTRIES.iter().map(|(label, _)| label.to_string()).collect()
}

pub fn industry_color(label: &str) -> &'static str {
    INDUSTRIES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(label))
        .map(|(_, color)| *color)
        .unwrap_or(DEFAULT_INDUSTRY_COLOR)
}
