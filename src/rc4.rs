//! RC4 stream cipher, used by the WEP and TKIP paths.
//!
//! Kept in-tree because no maintained registry crate exposes RC4 with the
//! runtime-length keys WEP requires (5-32 byte keys plus a 3-byte IV).

pub struct Rc4 {
    s: [u8; 256],
    i: u8,
    j: u8,
}

impl Rc4 {
    /// Run the key schedule for an arbitrary-length key.
    pub fn with_key(key: &[u8]) -> Self {
        debug_assert!(!key.is_empty() && key.len() <= 256);
        let mut s = [0u8; 256];
        for (i, v) in s.iter_mut().enumerate() {
            *v = i as u8;
        }
        let mut j: u8 = 0;
        for i in 0..256 {
            j = j.wrapping_add(s[i]).wrapping_add(key[i % key.len()]);
            s.swap(i, j as usize);
        }
        Self { s, i: 0, j: 0 }
    }

    /// XOR the keystream into `data` (encrypts and decrypts alike).
    pub fn xor_keystream(&mut self, data: &mut [u8]) {
        for byte in data {
            self.i = self.i.wrapping_add(1);
            self.j = self.j.wrapping_add(self.s[self.i as usize]);
            self.s.swap(self.i as usize, self.j as usize);
            let k = self.s[self.s[self.i as usize].wrapping_add(self.s[self.j as usize]) as usize];
            *byte ^= k;
        }
    }
}
