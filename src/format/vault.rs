//! Windows Vault files: the policy envelope and the per-item records.
//!
//! A vault directory holds one `Policy.vpol` and one `.vcrd` file per
//! stored item. The policy wraps an ordinary blob whose plaintext is a
//! small key store (magic `KDBM`) carrying the vault's AES-128 and AES-256
//! keys. Item files are a table of attributes addressed by absolute file
//! offsets; each attribute is independently encrypted with one of the
//! policy keys, so this parser keeps them separate rather than flattening
//! the item.

use chrono::{DateTime, Utc};
use tracing::warn;
use zeroize::Zeroizing;

use crate::errors::{DpapiError, Result};
use crate::format::blob::DpapiBlob;
use crate::format::guid::Guid;
use crate::format::reader::{filetime_to_datetime, utf16le_to_string, Reader};

const KDBM_MAGIC: &[u8; 4] = b"KDBM";
const ATTRIBUTE_MAP_ENTRY_LEN: usize = 12;

/// `Policy.vpol`: names the vault and wraps the key-store blob.
#[derive(Debug, Clone)]
pub struct VaultPolicy {
    pub version: u32,
    pub guid: Guid,
    pub name: String,
    pub key_blob: DpapiBlob,
}

impl VaultPolicy {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);
        let version = r.read_u32_le("vault policy version")?;
        let guid = Guid::from_le_bytes(r.read_array::<16>("vault policy guid")?);
        let name = utf16le_to_string(r.read_len_prefixed("vault policy name")?);
        r.skip(12, "vault policy header")?;
        r.read_u32_le("vault policy store size")?;
        r.skip(32, "vault policy store guids")?;
        let key_blob = DpapiBlob::parse(r.read_len_prefixed("vault policy key blob")?)?;
        Ok(VaultPolicy {
            version,
            guid,
            name,
            key_blob,
        })
    }
}

/// The two AES keys recovered from a decrypted policy blob.
pub struct VaultKeys {
    pub aes128: Zeroizing<Vec<u8>>,
    pub aes256: Zeroizing<Vec<u8>>,
}

impl VaultKeys {
    /// Parses the plaintext of the policy key blob: two `KDBM` key-data
    /// records, AES-128 first.
    pub fn parse(clear: &[u8]) -> Result<Self> {
        let mut r = Reader::new(clear);
        r.skip(12, "vault key store header")?;
        let aes128 = Self::read_kdbm(&mut r)?;
        r.skip(8, "vault key store padding")?;
        let aes256 = Self::read_kdbm(&mut r)?;
        Ok(VaultKeys { aes128, aes256 })
    }

    fn read_kdbm(r: &mut Reader<'_>) -> Result<Zeroizing<Vec<u8>>> {
        let magic = r.read_array::<4>("vault key magic")?;
        if &magic != KDBM_MAGIC {
            return Err(DpapiError::MalformedStructure(
                "vault key store is missing its KDBM magic".into(),
            ));
        }
        Ok(Zeroizing::new(
            r.read_len_prefixed("vault key material")?.to_vec(),
        ))
    }
}

/// One encrypted attribute of a vault item. `iv` present means the payload
/// was sealed with the vault's AES-256 key; absent means AES-128 with a
/// zero IV.
#[derive(Debug, Clone)]
pub struct VaultAttribute {
    pub id: u32,
    pub iv: Option<Vec<u8>>,
    pub data: Vec<u8>,
}

/// A parsed `.vcrd` file.
#[derive(Debug, Clone)]
pub struct VaultItem {
    pub schema: Guid,
    pub last_written: Option<DateTime<Utc>>,
    pub name: String,
    pub attributes: Vec<VaultAttribute>,
}

impl VaultItem {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);
        let schema = Guid::from_le_bytes(r.read_array::<16>("vault item schema guid")?);
        r.skip(4, "vault item header")?;
        let last_written = filetime_to_datetime(r.read_u64_le("vault item timestamp")?);
        r.skip(8, "vault item header")?;
        let name = utf16le_to_string(r.read_len_prefixed("vault item name")?);
        let map = r.read_len_prefixed("vault item attribute map")?;
        if map.len() % ATTRIBUTE_MAP_ENTRY_LEN != 0 {
            return Err(DpapiError::MalformedStructure(format!(
                "vault attribute map of {} bytes is not a multiple of {ATTRIBUTE_MAP_ENTRY_LEN}",
                map.len(),
            )));
        }

        let mut attributes = Vec::new();
        for entry in map.chunks_exact(ATTRIBUTE_MAP_ENTRY_LEN) {
            let id = u32::from_le_bytes([entry[0], entry[1], entry[2], entry[3]]);
            let offset =
                u32::from_le_bytes([entry[4], entry[5], entry[6], entry[7]]) as usize;
            if offset >= bytes.len() {
                warn!(id, offset, "vault attribute offset past end of file, skipping");
                continue;
            }
            match Self::parse_attribute(&bytes[offset..]) {
                Ok(Some(attr)) => attributes.push(attr),
                Ok(None) => {}
                Err(err) => warn!(id, offset, %err, "unreadable vault attribute, skipping"),
            }
        }

        Ok(VaultItem {
            schema,
            last_written,
            name,
            attributes,
        })
    }

    fn parse_attribute(bytes: &[u8]) -> Result<Option<VaultAttribute>> {
        let mut r = Reader::new(bytes);
        let id = r.read_u32_le("vault attribute id")?;
        r.skip(12, "vault attribute header")?;
        if id >= 100 {
            r.skip(4, "vault attribute extended header")?;
        }
        let size = r.read_u32_le("vault attribute size")? as usize;
        if size == 0 {
            return Ok(None);
        }
        let has_iv = r.read_u8("vault attribute iv flag")?;
        let (iv, data_len) = if has_iv == 1 {
            let iv = r.read_len_prefixed("vault attribute iv")?.to_vec();
            let overhead = 1 + 4 + iv.len();
            let Some(data_len) = size.checked_sub(overhead) else {
                return Err(DpapiError::MalformedStructure(
                    "vault attribute IV longer than the attribute itself".into(),
                ));
            };
            (Some(iv), data_len)
        } else {
            (None, size - 1)
        };
        let data = r.read_bytes(data_len, "vault attribute payload")?.to_vec();
        Ok(Some(VaultAttribute { id, iv, data }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::reader::utf16le_bytes;

    fn attribute_bytes(id: u32, iv: Option<&[u8]>, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&id.to_le_bytes());
        out.extend_from_slice(&[0; 12]);
        if id >= 100 {
            out.extend_from_slice(&[0; 4]);
        }
        match iv {
            Some(iv) => {
                let size = 1 + 4 + iv.len() + data.len();
                out.extend_from_slice(&(size as u32).to_le_bytes());
                out.push(1);
                out.extend_from_slice(&(iv.len() as u32).to_le_bytes());
                out.extend_from_slice(iv);
            }
            None => {
                out.extend_from_slice(&((1 + data.len()) as u32).to_le_bytes());
                out.push(0);
            }
        }
        out.extend_from_slice(data);
        out
    }

    fn item_bytes(name: &str, attrs: &[Vec<u8>]) -> Vec<u8> {
        let schema = Guid::parse("3ccd5499-87a8-4b10-a215-608888dd3b55").unwrap();
        let mut out = Vec::new();
        out.extend_from_slice(&schema.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&131_277_024_000_000_000u64.to_le_bytes());
        out.extend_from_slice(&[0; 8]);
        let name_raw = utf16le_bytes(name);
        out.extend_from_slice(&(name_raw.len() as u32).to_le_bytes());
        out.extend_from_slice(&name_raw);

        let map_len = attrs.len() * ATTRIBUTE_MAP_ENTRY_LEN;
        out.extend_from_slice(&(map_len as u32).to_le_bytes());
        let mut offset = out.len() + map_len;
        for (i, attr) in attrs.iter().enumerate() {
            out.extend_from_slice(&(i as u32 + 1).to_le_bytes());
            out.extend_from_slice(&(offset as u32).to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes());
            offset += attr.len();
        }
        for attr in attrs {
            out.extend_from_slice(attr);
        }
        out
    }

    #[test]
    fn item_attributes_resolve_through_the_offset_map() {
        let a1 = attribute_bytes(1, Some(&[0x10; 16]), &[0xAA; 32]);
        let a2 = attribute_bytes(2, None, &[0xBB; 16]);
        let raw = item_bytes("Web Credentials", &[a1, a2]);

        let item = VaultItem::parse(&raw).unwrap();
        assert_eq!(item.name, "Web Credentials");
        assert_eq!(
            item.last_written.unwrap().to_rfc3339(),
            "2017-01-01T00:00:00+00:00"
        );
        assert_eq!(item.attributes.len(), 2);
        assert_eq!(item.attributes[0].id, 1);
        assert_eq!(item.attributes[0].iv.as_deref(), Some(&[0x10u8; 16][..]));
        assert_eq!(item.attributes[0].data, vec![0xAA; 32]);
        assert_eq!(item.attributes[1].id, 2);
        assert!(item.attributes[1].iv.is_none());
        assert_eq!(item.attributes[1].data, vec![0xBB; 16]);
    }

    #[test]
    fn high_id_attributes_carry_an_extra_header_field() {
        let raw = attribute_bytes(100, None, &[0xCC; 8]);
        let attr = VaultItem::parse_attribute(&raw).unwrap().unwrap();
        assert_eq!(attr.id, 100);
        assert_eq!(attr.data, vec![0xCC; 8]);
    }

    #[test]
    fn out_of_range_attribute_offsets_are_skipped_not_fatal() {
        let a1 = attribute_bytes(1, None, &[0xAA; 8]);
        let mut raw = item_bytes("Web Credentials", &[a1]);
        // Point the single map entry far past the end of the file.
        let map_entry_offset = raw.len() - (ATTRIBUTE_MAP_ENTRY_LEN + a1_len()) + 4;
        raw[map_entry_offset..map_entry_offset + 4]
            .copy_from_slice(&0xFFFF_FFF0u32.to_le_bytes());
        let item = VaultItem::parse(&raw).unwrap();
        assert!(item.attributes.is_empty());
    }

    fn a1_len() -> usize {
        attribute_bytes(1, None, &[0xAA; 8]).len()
    }

    #[test]
    fn key_store_yields_both_aes_keys() {
        let mut clear = vec![0u8; 12];
        clear.extend_from_slice(b"KDBM");
        clear.extend_from_slice(&16u32.to_le_bytes());
        clear.extend_from_slice(&[0x01; 16]);
        clear.extend_from_slice(&[0; 8]);
        clear.extend_from_slice(b"KDBM");
        clear.extend_from_slice(&32u32.to_le_bytes());
        clear.extend_from_slice(&[0x02; 32]);

        let keys = VaultKeys::parse(&clear).unwrap();
        assert_eq!(keys.aes128.as_slice(), &[0x01; 16]);
        assert_eq!(keys.aes256.as_slice(), &[0x02; 32]);

        clear[12] = b'X';
        assert!(matches!(
            VaultKeys::parse(&clear),
            Err(DpapiError::MalformedStructure(_))
        ));
    }
}
