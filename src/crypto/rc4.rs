/// Stateful RC4 stream cipher. Encryption and decryption are the same
/// operation, so one `process` call serves both directions.
#[derive(Clone)]
pub struct Rc4 {
    state: [u8; 256],
    i: u8,
    j: u8,
}

impl Rc4 {
    pub fn new(key: &[u8]) -> Self {
        let mut state = [0x00; 256];
        for (index, value) in state.iter_mut().enumerate() {
            *value = index as u8;
        }

        let mut j: u8 = 0;
        for i in 0..256 {
            j = j
                .wrapping_add(state[i])
                .wrapping_add(key[i % key.len()]);
            state.swap(i, j as usize);
        }

        Self { state, i: 0, j: 0 }
    }

    pub fn process(&mut self, message: &[u8]) -> Vec<u8> {
        message
            .iter()
            .map(|byte| {
                self.i = self.i.wrapping_add(1);
                self.j = self.j.wrapping_add(self.state[self.i as usize]);
                self.state.swap(self.i as usize, self.j as usize);

                let index = self.state[self.i as usize].wrapping_add(self.state[self.j as usize]);

                byte ^ self.state[index as usize]
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        let mut cipher = Rc4::new(b"Key");

        assert_eq!(
            cipher.process(b"Plaintext"),
            [0xBB, 0xF3, 0x16, 0xE8, 0xD9, 0x40, 0xAF, 0x0A, 0xD3]
        );
    }

    #[test]
    fn process_twice_round_trips() {
        let key = [0x5A; 16];
        let plaintext = [0x10, 0x20, 0x30, 0x40];

        let encrypted = Rc4::new(&key).process(&plaintext);
        let decrypted = Rc4::new(&key).process(&encrypted);

        assert_eq!(decrypted, plaintext);
    }
}
