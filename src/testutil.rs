//! Shared test fixtures for building synthetic kext images in memory.

use crate::macho::{names, KextSymbolTable, RelocTarget, Symbol, VTABLE_HEADER_LEN};
use crate::vtable::{Vtable, VtableEntry, VtableStore};

/// Base vm address of the fixture's single mapped segment.
pub const BASE: u64 = 0x10000;

const IMAGE_SIZE: usize = 0x4000;

/// One raw vtable slot as written into the fixture image.
pub enum RawSlot {
    /// A statically resolved address.
    Value(u64),
    /// A zero slot covered by an external relocation to a symbol.
    Reloc(usize),
    /// A zero slot whose relocation lost its stripped local symbol.
    StrippedReloc,
}

/// One method slot of a synthetic class.
pub enum ClassSlot<'a> {
    /// A method implemented by the class itself; the mangled suffix
    /// (e.g. `3fooEv`) is appended to the class's member prefix.
    Method(&'a str),
    /// A full symbol name declared but never implemented anywhere.
    Undefined(&'a str),
}

/// A synthetic kext with a zeroed image, one identity-mapped segment and a
/// bump allocator for placing data.
pub struct KextFixture {
    pub table: KextSymbolTable,
    cursor: u64,
}

impl KextFixture {
    pub fn new() -> Self {
        // The loaded range spans dependency addresses below the image so
        // that inherited implementations validate as in-range.
        let mut table = KextSymbolTable::new(vec![0u8; IMAGE_SIZE], 0x1000..0x40000);
        table.add_mapping(BASE, 0, IMAGE_SIZE as u64);
        Self {
            table,
            cursor: BASE,
        }
    }

    /// Reserves `size` bytes of image space, returning their vm address.
    pub fn alloc(&mut self, size: u64) -> u64 {
        let addr = self.cursor;
        self.cursor += (size + 15) & !15;
        assert!(
            self.cursor <= BASE + IMAGE_SIZE as u64,
            "fixture image exhausted"
        );
        addr
    }

    /// Adds an externally visible defined symbol.
    pub fn define(&mut self, name: &str, addr: u64) -> usize {
        self.table.add_symbol(Symbol::defined(name, addr, true))
    }

    /// Adds a locally defined symbol.
    pub fn define_local(&mut self, name: &str, addr: u64) -> usize {
        self.table.add_symbol(Symbol::defined(name, addr, false))
    }

    /// Adds an undefined external symbol.
    pub fn undefined(&mut self, name: &str) -> usize {
        self.table.add_symbol(Symbol::undefined(name))
    }

    /// Writes an 8-byte little-endian value at the given vm address.
    pub fn write_u64(&mut self, addr: u64, value: u64) {
        let offset = (addr - BASE) as usize;
        self.table.image_mut()[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }

    /// Records an external relocation at the given vm address.
    pub fn reloc(&mut self, addr: u64, target: RelocTarget) {
        self.table.add_extern_reloc(addr, target);
    }

    /// Lays out a vtable at `addr` with the given method slots and defines
    /// its symbol. The header slots and the trailing sentinel stay zero.
    pub fn raw_vtable(&mut self, name: &str, addr: u64, slots: &[RawSlot]) -> usize {
        for (index, slot) in slots.iter().enumerate() {
            let slot_addr = addr + ((VTABLE_HEADER_LEN + index) * 8) as u64;
            match slot {
                RawSlot::Value(value) => self.write_u64(slot_addr, *value),
                RawSlot::Reloc(sym) => self.reloc(slot_addr, RelocTarget::Symbol(*sym)),
                RawSlot::StrippedReloc => self.reloc(slot_addr, RelocTarget::Stripped),
            }
        }
        self.define(name, addr)
    }

    /// Lays out a full synthetic class: implemented methods, class and
    /// metaclass vtables, and the SMCP naming the superclass.
    pub fn add_class_with_slots(&mut self, class: &str, superclass: &str, slots: &[ClassSlot<'_>]) {
        let mut raw = Vec::new();
        for slot in slots {
            match slot {
                ClassSlot::Method(suffix) => {
                    let addr = self.alloc(16);
                    self.define(&format!("__ZN{class}{suffix}"), addr);
                    raw.push(RawSlot::Value(addr));
                }
                ClassSlot::Undefined(name) => {
                    let sym = self.undefined(name);
                    raw.push(RawSlot::Reloc(sym));
                }
            }
        }

        let vt_addr = self.alloc(((raw.len() + 3) * 8) as u64);
        self.raw_vtable(&names::vtable_name_from_class(class), vt_addr, &raw);

        let meta_addr = self.alloc(0x20);
        self.raw_vtable(&names::meta_vtable_name_from_class(class), meta_addr, &[]);

        let smcp_addr = self.alloc(8);
        self.define(&format!("__ZN{class}10superClassE"), smcp_addr);
        let metaclass = self.undefined(&format!("__ZN{superclass}10gMetaClassE"));
        self.reloc(smcp_addr, RelocTarget::Symbol(metaclass));
    }

    /// Shorthand for a class whose listed methods it implements itself.
    pub fn add_class(&mut self, class: &str, superclass: &str, methods: &[&str]) {
        let slots: Vec<ClassSlot<'_>> = methods.iter().map(|&m| ClassSlot::Method(m)).collect();
        self.add_class_with_slots(class, superclass, &slots);
    }
}

/// Installs a process-wide test subscriber so traced runs show the engine's
/// per-slot decisions. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

/// A dependency store standing in for an already-linked kernel: the `4Base`
/// class vtable and OSMetaClass's own vtable.
pub fn kernel_store() -> VtableStore {
    let mut store = VtableStore::new();
    store
        .insert(Vtable {
            name: "__ZTV4Base".to_string(),
            entries: vec![VtableEntry::named("__ZN4Base3fooEv", 0x1000)],
        })
        .unwrap();
    store
        .insert(Vtable {
            name: names::OS_METACLASS_VTABLE_NAME.to_string(),
            entries: vec![VtableEntry::named("__ZN11OSMetaClassD2Ev", 0x1100)],
        })
        .unwrap();
    store
}
