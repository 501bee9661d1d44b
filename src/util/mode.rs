pub type ModeBits = u32;

pub const PERMISSIONS_MASK: ModeBits = 0o7777;
pub const TYPE_MASK: ModeBits = 0o170000;
pub const IS_DIR_MASK: ModeBits = 0o040000;
pub const IS_FILE_MASK: ModeBits = 0o100000;

pub trait ModeBitsHelper {
    fn get_permissions(&self) -> ModeBits;
    fn get_type(&self) -> ModeBits;
    fn is_directory(&self) -> bool;
    fn is_file(&self) -> bool;
    fn with_permissions(&self, permissions: ModeBits) -> ModeBits;
}

impl ModeBitsHelper for ModeBits {
    fn get_permissions(&self) -> ModeBits {
        self & PERMISSIONS_MASK
    }

    fn get_type(&self) -> ModeBits {
        self & TYPE_MASK
    }

    fn is_directory(&self) -> bool {
        self.get_type() == IS_DIR_MASK
    }

    fn is_file(&self) -> bool {
        self.get_type() == IS_FILE_MASK
    }

    /// Keeps the type bits, replaces the permission bits.
    fn with_permissions(&self, permissions: ModeBits) -> ModeBits {
        self.get_type() | permissions.get_permissions()
    }
}
