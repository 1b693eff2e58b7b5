use std::ops::Range;

/// Service type browsed and advertised by the peer daemon
pub const PEER_SERVICE_TYPE: &str = "_http._tcp.";

/// DNS-SD domain suffix for link-local names
pub const LOCAL_DOMAIN: &str = "local.";

/// Longest instance name accepted for self-advertisement
pub const MAX_INSTANCE_NAME_LEN: usize = 15;

/// Numeric range candidate name tokens and ports are drawn from
pub const CANDIDATE_RANGE: Range<u16> = 10_000..60_000;

/// Characters allowed in a locally generated instance name
pub fn is_valid_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

/// Accepts both relative ("_http._tcp.") and qualified
/// ("_http._tcp.local.") spellings.
pub fn is_valid_service_type(ty: &str) -> bool {
    let base = ty.strip_suffix(LOCAL_DOMAIN).unwrap_or(ty);
    ty.starts_with('_') && (base.ends_with("._tcp.") || base.ends_with("._udp."))
}

/// Service type with the local domain appended, as the mDNS layer wants it
pub fn qualified_type(ty: &str) -> String {
    if ty.ends_with(LOCAL_DOMAIN) {
        ty.to_string()
    } else {
        format!("{}{}", ty, LOCAL_DOMAIN)
    }
}

/// Service type without the local domain, the spelling the engine stores
pub fn relative_type(ty: &str) -> &str {
    ty.strip_suffix(LOCAL_DOMAIN).unwrap_or(ty)
}

/// Full DNS-SD instance name, e.g. "peer-12345._http._tcp.local."
pub fn instance_fullname(name: &str, ty: &str) -> String {
    format!("{}.{}", name, qualified_type(ty))
}

/// Instance name part of a fullname, given the qualified type it belongs to
pub fn split_instance<'a>(fullname: &'a str, qualified_ty: &str) -> Option<&'a str> {
    fullname
        .strip_suffix(qualified_ty)
        .and_then(|rest| rest.strip_suffix('.'))
        .filter(|name| !name.is_empty())
}
