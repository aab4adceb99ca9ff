//! AVP dictionary: the name/code/type/vendor mapping consulted by the codec.
//!
//! The dictionary is built once before the engine starts accepting
//! connections and is never mutated afterwards. Loading entries from a
//! configuration resource is the loader's job; this module only models the
//! resolved table. [`Dictionary::base`] preloads the base-protocol AVPs the
//! engine itself needs.

use std::collections::HashMap;

use crate::protocol::constants::avp_code;

/// Declared data type of an AVP.
///
/// Scalar types plus `Grouped`. Enumerated entries are declared as
/// [`Integer32`](AvpType::Integer32) with their allowed values attached to
/// the [`DictionaryEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvpType {
    OctetString,
    Utf8String,
    Unsigned32,
    Integer32,
    Unsigned64,
    Address,
    Grouped,
}

/// One resolved dictionary entry.
#[derive(Debug, Clone)]
pub struct DictionaryEntry {
    /// AVP name, e.g. `"Origin-Host"`.
    pub name: String,
    /// AVP code.
    pub code: u32,
    /// Vendor id, 0 when the AVP is not vendor-specific.
    pub vendor_id: u32,
    /// Declared data type.
    pub data_type: AvpType,
    /// Allowed values for enumerated entries.
    pub enum_values: Option<Vec<i32>>,
}

impl DictionaryEntry {
    /// Create an entry with no vendor id and no enumerated values.
    pub fn new(name: &str, code: u32, data_type: AvpType) -> Self {
        Self {
            name: name.to_string(),
            code,
            vendor_id: 0,
            data_type,
            enum_values: None,
        }
    }

    /// Set the vendor id.
    pub fn with_vendor(mut self, vendor_id: u32) -> Self {
        self.vendor_id = vendor_id;
        self
    }

    /// Attach the allowed values of an enumerated entry.
    pub fn with_enum_values(mut self, values: Vec<i32>) -> Self {
        self.enum_values = Some(values);
        self
    }
}

/// Read-only name/code mapping table.
///
/// Lookup works in both directions: by name for encoding, by
/// `(code, vendor_id)` for decoding.
#[derive(Debug, Default)]
pub struct Dictionary {
    entries: Vec<DictionaryEntry>,
    by_name: HashMap<String, usize>,
    by_code: HashMap<(u32, u32), usize>,
}

impl Dictionary {
    /// Create an empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a dictionary preloaded with the base-protocol AVPs.
    pub fn base() -> Self {
        let mut dict = Self::new();
        dict.insert(DictionaryEntry::new(
            "Host-IP-Address",
            avp_code::HOST_IP_ADDRESS,
            AvpType::Address,
        ));
        dict.insert(DictionaryEntry::new(
            "Auth-Application-Id",
            avp_code::AUTH_APPLICATION_ID,
            AvpType::Unsigned32,
        ));
        dict.insert(DictionaryEntry::new(
            "Acct-Application-Id",
            avp_code::ACCT_APPLICATION_ID,
            AvpType::Unsigned32,
        ));
        dict.insert(DictionaryEntry::new(
            "Vendor-Specific-Application-Id",
            avp_code::VENDOR_SPECIFIC_APPLICATION_ID,
            AvpType::Grouped,
        ));
        dict.insert(DictionaryEntry::new(
            "Origin-Host",
            avp_code::ORIGIN_HOST,
            AvpType::Utf8String,
        ));
        dict.insert(DictionaryEntry::new(
            "Supported-Vendor-Id",
            avp_code::SUPPORTED_VENDOR_ID,
            AvpType::Unsigned32,
        ));
        dict.insert(DictionaryEntry::new(
            "Vendor-Id",
            avp_code::VENDOR_ID,
            AvpType::Unsigned32,
        ));
        dict.insert(DictionaryEntry::new(
            "Firmware-Revision",
            avp_code::FIRMWARE_REVISION,
            AvpType::Unsigned32,
        ));
        dict.insert(DictionaryEntry::new(
            "Result-Code",
            avp_code::RESULT_CODE,
            AvpType::Unsigned32,
        ));
        dict.insert(DictionaryEntry::new(
            "Product-Name",
            avp_code::PRODUCT_NAME,
            AvpType::Utf8String,
        ));
        dict.insert(
            DictionaryEntry::new(
                "Disconnect-Cause",
                avp_code::DISCONNECT_CAUSE,
                AvpType::Integer32,
            )
            .with_enum_values(vec![0, 1, 2]),
        );
        dict.insert(DictionaryEntry::new(
            "Origin-State-Id",
            avp_code::ORIGIN_STATE_ID,
            AvpType::Unsigned32,
        ));
        dict.insert(DictionaryEntry::new(
            "Failed-AVP",
            avp_code::FAILED_AVP,
            AvpType::Grouped,
        ));
        dict.insert(DictionaryEntry::new(
            "Error-Message",
            avp_code::ERROR_MESSAGE,
            AvpType::Utf8String,
        ));
        dict.insert(DictionaryEntry::new(
            "Destination-Realm",
            avp_code::DESTINATION_REALM,
            AvpType::Utf8String,
        ));
        dict.insert(DictionaryEntry::new(
            "Destination-Host",
            avp_code::DESTINATION_HOST,
            AvpType::Utf8String,
        ));
        dict.insert(DictionaryEntry::new(
            "Origin-Realm",
            avp_code::ORIGIN_REALM,
            AvpType::Utf8String,
        ));
        dict
    }

    /// Insert an entry. Later inserts win on name or code collisions.
    pub fn insert(&mut self, entry: DictionaryEntry) {
        let index = self.entries.len();
        self.by_name.insert(entry.name.clone(), index);
        self.by_code.insert((entry.code, entry.vendor_id), index);
        self.entries.push(entry);
    }

    /// Resolve an AVP name to its entry.
    pub fn resolve_name(&self, name: &str) -> Option<&DictionaryEntry> {
        self.by_name.get(name).map(|&i| &self.entries[i])
    }

    /// Resolve `(code, vendor_id)` to its entry.
    pub fn resolve_code(&self, code: u32, vendor_id: u32) -> Option<&DictionaryEntry> {
        self.by_code.get(&(code, vendor_id)).map(|&i| &self.entries[i])
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the dictionary is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
