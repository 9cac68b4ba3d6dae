use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

// Keeps `(page - 1) * size` well inside the i64 range the SQL OFFSET accepts.
pub const MAX_PAGE: u64 = u32::MAX as u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated actor attached to a request once the gate lets it through.
///
/// Built from a user store lookup that never selects the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: Role,
}

impl Principal {
    pub fn has_role(&self, role: Role) -> bool {
        self.role == role
    }
}

/// Offset/limit pair derived from a requested page number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    page: u64,
    size: u32,
}

impl PageWindow {
    /// Page numbers below 1 collapse to 1; a zero size is bumped to 1.
    pub fn new(page: i64, size: u32) -> Self {
        let page = if page < 1 { 1 } else { (page as u64).min(MAX_PAGE) };
        Self {
            page,
            size: size.max(1),
        }
    }

    /// Parses the `page` query value. Absent or non-numeric input means page 1.
    pub fn from_query(raw: Option<&str>, size: u32) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return Self::new(1, size);
        };

        match raw.parse::<i64>() {
            Ok(page) => Self::new(page, size),
            Err(_) if raw.bytes().all(|b| b.is_ascii_digit()) => Self::new(i64::MAX, size),
            Err(_) => Self::new(1, size),
        }
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn offset(&self) -> u64 {
        (self.page - 1) * u64::from(self.size)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.size)
    }

    pub fn total_pages(&self, total_items: u64) -> u64 {
        total_items.div_ceil(u64::from(self.size))
    }

    /// Applies the window to an already ordered slice.
    pub fn slice<'a, T>(&self, ordered: &'a [T]) -> &'a [T] {
        let len = ordered.len() as u64;
        let start = self.offset().min(len) as usize;
        let end = (self.offset() + self.limit()).min(len) as usize;
        &ordered[start..end]
    }
}

/// One page of a collection plus pagination metadata.
///
/// Serializes as `{ "<collection>": [...], "currentPage", "totalPages", "totalItems" }`.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing<T> {
    pub collection: &'static str,
    pub items: Vec<T>,
    pub current_page: u64,
    pub total_pages: u64,
    pub total_items: u64,
}

impl<T> Listing<T> {
    pub fn new(collection: &'static str, window: PageWindow, items: Vec<T>, total_items: u64) -> Self {
        Self {
            collection,
            items,
            current_page: window.page(),
            total_pages: window.total_pages(total_items),
            total_items,
        }
    }
}

impl<T: Serialize> Serialize for Listing<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(4))?;
        map.serialize_entry(self.collection, &self.items)?;
        map.serialize_entry("currentPage", &self.current_page)?;
        map.serialize_entry("totalPages", &self.total_pages)?;
        map.serialize_entry("totalItems", &self.total_items)?;
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBody {
    pub message: String,
}
