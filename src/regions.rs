/// Storefront country codes and the currency each one prices in, in output
/// column order. Every currency gets its three price columns in the table
/// regardless of whether data was obtainable for it.
pub const REGIONS: [(&str, &str); 35] = [
    ("us", "USD"),
    ("gb", "GBP"),
    ("eu", "EUR"),
    ("br", "BRL"),
    ("ru", "RUB"),
    ("pl", "PLN"),
    ("ch", "CHF"),
    ("no", "NOK"),
    ("ca", "CAD"),
    ("au", "AUD"),
    ("nz", "NZD"),
    ("jp", "JPY"),
    ("kr", "KRW"),
    ("cn", "CNY"),
    ("tw", "TWD"),
    ("hk", "HKD"),
    ("sg", "SGD"),
    ("my", "MYR"),
    ("id", "IDR"),
    ("ph", "PHP"),
    ("th", "THB"),
    ("vn", "VND"),
    ("mx", "MXN"),
    ("cl", "CLP"),
    ("co", "COP"),
    ("pe", "PEN"),
    ("uy", "UYU"),
    ("il", "ILS"),
    ("sa", "SAR"),
    ("ae", "AED"),
    ("qa", "QAR"),
    ("kw", "KWD"),
    ("za", "ZAR"),
    ("in", "INR"),
    ("ua", "UAH"),
];

// ── Tests ──
