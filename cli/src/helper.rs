use mesh_node::mesh::Token;

pub fn is_token_validator(input: String) -> Result<(), String> {
    match input.parse::<Token>() {
        Ok(_) => Ok(()),
        Err(err) => Err(format!("'{}' is not a valid token: {}", &input, err)),
    }
}

/// Parses an even-length hex string into bytes.
pub fn parse_hex_bytes(s: &str) -> Option<Vec<u8>> {
    if s.is_empty() || s.len() % 2 == 1 {
        return None;
    }
    let mut out = Vec::with_capacity(s.len() / 2);
    let bytes = s.as_bytes();
    for pair in bytes.chunks_exact(2) {
        let text = core::str::from_utf8(pair).ok()?;
        out.push(u8::from_str_radix(text, 16).ok()?);
    }
    Some(out)
}

pub fn tokio_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("can't make async runtime")
}
