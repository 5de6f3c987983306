// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

/// The source of randomness of a context.
///
/// Connection IDs, path challenges and the random initial packet number are
/// visible on the wire and use the public fill. Table seeds, the reset seed
/// and the retry seed never leave the endpoint and use the private fill.
pub trait Generator: 'static {
    fn public_random_fill(&mut self, dest: &mut [u8]);

    fn private_random_fill(&mut self, dest: &mut [u8]);
}

/// Draws a public random `u64`
#[inline]
pub fn public_u64<R: Generator + ?Sized>(random_generator: &mut R) -> u64 {
    let mut dest = [0; 8];
    random_generator.public_random_fill(&mut dest);
    u64::from_le_bytes(dest)
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use crate::random;

    /// A predictable generator which derives every byte from a rolling seed
    #[derive(Debug, Default)]
    pub struct Generator(pub u8);

    impl random::Generator for Generator {
        fn public_random_fill(&mut self, dest: &mut [u8]) {
            let seed = self.0;

            for (i, elem) in dest.iter_mut().enumerate() {
                *elem = seed ^ i as u8;
            }

            self.0 = self.0.wrapping_add(1)
        }

        fn private_random_fill(&mut self, dest: &mut [u8]) {
            let seed = u8::MAX - self.0;

            for (i, elem) in dest.iter_mut().enumerate() {
                *elem = seed ^ i as u8;
            }

            self.0 = self.0.wrapping_add(1)
        }
    }

    /// A generator that always fills with the same byte
    #[derive(Debug, Default)]
    pub struct Constant(pub u8);

    impl random::Generator for Constant {
        fn public_random_fill(&mut self, dest: &mut [u8]) {
            dest.fill(self.0);
        }

        fn private_random_fill(&mut self, dest: &mut [u8]) {
            dest.fill(self.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::random;

    #[test]
    fn rolling_seed_test() {
        bolero::check!().with_type::<u8>().cloned().for_each(|seed| {
            let mut generator = random::testing::Generator(seed);
            let first = random::public_u64(&mut generator);
            let second = random::public_u64(&mut generator);
            assert_ne!(first, second);
        });
    }
}
