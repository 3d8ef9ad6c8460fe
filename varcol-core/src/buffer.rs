//! Reusable typed buffers holding the raw value of one record.

use bytes::BytesMut;

use crate::error::ColumnError;
use crate::types::Domain;
use crate::value::Value;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
/// The physical layout of a [ValueBuffer].
pub enum BufferLayout {
    /// A single run of bytes.
    Bulk,
    /// Fixed width elements, all of the buffer's domain.
    UVector,
    /// Variable length elements with their own weight and domain.
    Vector,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
/// The flags word of a [ValueBuffer].
pub struct BufferFlags {
    pub layout: BufferLayout,
    /// Only meaningful for [BufferLayout::Vector].
    pub with_weight: bool,
}

impl BufferFlags {
    pub const fn bulk() -> Self {
        Self {
            layout: BufferLayout::Bulk,
            with_weight: false,
        }
    }

    pub const fn uvector() -> Self {
        Self {
            layout: BufferLayout::UVector,
            with_weight: false,
        }
    }

    pub const fn vector() -> Self {
        Self {
            layout: BufferLayout::Vector,
            with_weight: false,
        }
    }

    pub const fn weighted_vector() -> Self {
        Self {
            layout: BufferLayout::Vector,
            with_weight: true,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct Section {
    offset: usize,
    length: usize,
    weight: u32,
    domain: Domain,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
/// A borrowed view of one element of a vector buffer.
pub struct ElementRef<'a> {
    pub bytes: &'a [u8],
    pub weight: u32,
    pub domain: Domain,
}

#[derive(Debug)]
/// A byte buffer tagged with a domain and a flags word.
///
/// The buffer is owned by a single accessor and is reinitialized in place
/// for every read and write. The backing allocation is kept between calls
/// and only grows when a value does not fit.
pub struct ValueBuffer {
    domain: Domain,
    flags: BufferFlags,
    body: BytesMut,
    sections: Vec<Section>,
}

impl ValueBuffer {
    /// Opens a new, empty buffer.
    pub fn open(domain: Domain, flags: BufferFlags) -> Self {
        Self {
            domain,
            flags,
            body: BytesMut::new(),
            sections: Vec::new(),
        }
    }

    /// Clears the content and rewrites the domain and flags.
    ///
    /// Switching away from the vector layout releases the section table.
    pub fn reinit(&mut self, domain: Domain, flags: BufferFlags) {
        if self.flags.layout != flags.layout && flags.layout != BufferLayout::Vector {
            self.sections = Vec::new();
        }

        self.rewind();
        self.domain = domain;
        self.flags = flags;
    }

    #[inline]
    /// Clears the content, keeping the domain and flags.
    pub fn rewind(&mut self) {
        self.body.clear();
        self.sections.clear();
    }

    #[inline]
    pub fn domain(&self) -> Domain {
        self.domain
    }

    #[inline]
    pub fn flags(&self) -> BufferFlags {
        self.flags
    }

    #[inline]
    /// Retags the buffer with a new domain without touching its content.
    pub fn set_domain(&mut self, domain: Domain) {
        self.domain = domain;
    }

    #[inline]
    /// Returns `true` if the buffer holds no bytes and no elements.
    pub fn is_empty(&self) -> bool {
        self.body.is_empty() && self.sections.is_empty()
    }

    #[inline]
    /// The raw bytes of the buffer.
    pub fn head(&self) -> &[u8] {
        &self.body
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.body.capacity()
    }

    #[inline]
    pub(crate) fn body_mut(&mut self) -> &mut BytesMut {
        &mut self.body
    }

    /// Appends raw bytes to a bulk buffer.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.body.extend_from_slice(bytes);
    }

    /// The number of elements held by a vector buffer.
    ///
    /// Bulk buffers have no elements.
    pub fn element_count(&self) -> usize {
        match self.flags.layout {
            BufferLayout::Bulk => 0,
            BufferLayout::UVector => match self.domain.fixed_size() {
                Some(width) => self.body.len() / width,
                None => 0,
            },
            BufferLayout::Vector => self.sections.len(),
        }
    }

    /// Returns the element at `index` if it exists.
    ///
    /// Elements of a uvector always report the buffer's domain and a
    /// weight of `0`.
    pub fn element(&self, index: usize) -> Option<ElementRef<'_>> {
        match self.flags.layout {
            BufferLayout::Bulk => None,
            BufferLayout::UVector => {
                let width = self.domain.fixed_size()?;
                let start = index.checked_mul(width)?;
                let bytes = self.body.get(start..start + width)?;
                Some(ElementRef {
                    bytes,
                    weight: 0,
                    domain: self.domain,
                })
            },
            BufferLayout::Vector => {
                let section = self.sections.get(index)?;
                Some(ElementRef {
                    bytes: &self.body[section.offset..section.offset + section.length],
                    weight: section.weight,
                    domain: section.domain,
                })
            },
        }
    }

    /// Appends an element to a vector buffer.
    ///
    /// Weights are dropped unless the buffer is weighted. A uvector only
    /// accepts elements exactly as wide as its domain.
    pub fn add_element(
        &mut self,
        bytes: &[u8],
        weight: u32,
        domain: Domain,
    ) -> Result<(), ColumnError> {
        match self.flags.layout {
            BufferLayout::Bulk => Err(ColumnError::contract(
                "elements cannot be added to a bulk buffer",
            )),
            BufferLayout::UVector => {
                let width = self.domain.fixed_size().ok_or_else(|| {
                    ColumnError::contract(format!(
                        "uvector domain {} has no fixed element width",
                        self.domain
                    ))
                })?;
                if bytes.len() != width {
                    return Err(ColumnError::contract(format!(
                        "uvector of {} expects {width} byte elements, got {}",
                        self.domain,
                        bytes.len()
                    )));
                }
                self.body.extend_from_slice(bytes);
                Ok(())
            },
            BufferLayout::Vector => {
                let offset = self.body.len();
                self.body.extend_from_slice(bytes);
                self.sections.push(Section {
                    offset,
                    length: bytes.len(),
                    weight: if self.flags.with_weight { weight } else { 0 },
                    domain,
                });
                Ok(())
            },
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
/// The class of the elements staged through a [ScratchBuffer].
pub enum ElementClass {
    /// Keys of a table, the elements are typed to the table's key domain.
    UVector { table: Domain, key_domain: Domain },
    /// Plain values typed to the column range.
    Vector { domain: Domain },
}

impl ElementClass {
    /// The domain the staged elements are typed to.
    pub fn domain(self) -> Domain {
        match self {
            Self::UVector { key_domain, .. } => key_domain,
            Self::Vector { domain } => domain,
        }
    }
}

#[derive(Debug)]
/// The auxiliary per-element buffer of a weighted vector accessor.
///
/// Each element is staged here at its natural domain before being
/// appended to the record's [ValueBuffer].
pub struct ScratchBuffer {
    class: ElementClass,
    buffer: ValueBuffer,
}

impl ScratchBuffer {
    pub fn open(class: ElementClass) -> Self {
        Self {
            class,
            buffer: ValueBuffer::open(class.domain(), BufferFlags::bulk()),
        }
    }

    #[inline]
    pub fn class(&self) -> ElementClass {
        self.class
    }

    /// Drops the staged bytes and restores the class domain.
    pub fn rewind(&mut self) {
        self.buffer.rewind();
        self.buffer.set_domain(self.class.domain());
    }

    /// Stages `value` at its natural domain.
    ///
    /// Key elements must be compatible with the key domain of the table.
    pub fn stage(&mut self, value: &Value) -> Result<(), ColumnError> {
        if let ElementClass::UVector { table, key_domain } = self.class {
            let natural = value.natural_domain();
            if !key_domain.is_compatible(natural) {
                return Err(ColumnError::contract(format!(
                    "element of {natural} is not a valid key of {table} keyed by {key_domain}"
                )));
            }
        }

        let domain = value.write_natural(self.buffer.body_mut());
        self.buffer.set_domain(domain);
        Ok(())
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        self.buffer.head()
    }

    #[inline]
    pub fn domain(&self) -> Domain {
        self.buffer.domain()
    }
}
