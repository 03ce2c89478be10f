use qradmin::encryption::TokenEncoder;
use qradmin::generator::generate;
use qradmin::models::GeneratedItem;

pub const BASE_URL: &str = "https://example.com/r";

/// Initialize tracing for tests with proper test output handling
pub fn tracing_init() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[allow(unused)]
pub fn test_encoder() -> TokenEncoder {
    TokenEncoder::new("0123456789abcdef", "fedcba9876543210").unwrap()
}

/// Generated items for serials `start..=end`
#[allow(unused)] // Not every test binary needs it
pub fn generated(start: i64, end: i64) -> Vec<GeneratedItem> {
    generate(BASE_URL, start, end, &test_encoder())
}
