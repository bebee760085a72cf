//! C4: struct-of-arrays rings over several parallel C3 instances.
//!
//! `spec.md` §9 "Compile-time type synthesis" calls for generics plus
//! macros in place of the source's runtime reflection. `define_multi_ring!`
//! is that macro: given a record type's field list it emits a rings
//! container, a borrowed `Slice` view, and a `Pushed` count tuple — the
//! `RingBuffers`/`Slice`/`Pushed` product types of `spec.md` §4.4 — each
//! field backed by one [`crate::ring::Ring`]. No `paste`/`concat_idents!`
//! is used: `pushField`/`sliceField`/etc. from §4.4 are simply the public
//! per-field `Ring` handle's own methods (`rings.x.push(v)`), since the
//! fields are exposed directly rather than behind synthesized accessor
//! names.
use crate::layout;

fn gcd(a: usize, b: usize) -> usize {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

fn lcm(a: usize, b: usize) -> usize {
    a / gcd(a, b) * b
}

/// Computes the synchronised minimum element count `m` across a set of
/// field byte sizes (`spec.md` §3 "Multi-ring handle" / §4.4 "Allocation
/// strategy"): for each field size `sz`, `r = granularity / gcd(granularity,
/// sz)`; `m = lcm(r_1, .., r_n)`. If the caller's requested count `q <= m`,
/// all sub-rings are sized to `m`; otherwise to `m * ceil(q / m)`.
pub fn synchronized_element_count(field_byte_sizes: &[usize], requested: usize) -> usize {
    assert!(!field_byte_sizes.is_empty(), "a multi-ring needs at least one field");
    let granularity = layout::allocation_granularity();

    let m = field_byte_sizes.iter().fold(1usize, |acc, &sz| {
        let r = granularity / gcd(granularity, sz.max(1));
        lcm(acc, r)
    });

    if requested <= m {
        m
    } else {
        let multiples = (requested + m - 1) / m;
        m * multiples
    }
}

/// Defines a struct-of-arrays ring over a record type.
///
/// ```ignore
/// define_multi_ring! {
///     pub struct TradeRings / TradeSlice<'a> / TradePushed
///     header = TradeHeader;
///     record = Trade;
///     fields = { x: f64, y: f64, timestamp: u64 }
/// }
/// ```
///
/// `record` must be a `Copy` struct whose field names match `fields`
/// exactly (e.g. `Trade { x: f64, y: f64, timestamp: u64 }`); `header`
/// names the shared user-header type every sub-ring carries.
#[macro_export]
macro_rules! define_multi_ring {
    (
        $(#[$meta:meta])*
        $vis:vis struct $rings:ident / $slice:ident<$lt:lifetime> / $pushed:ident
        header = $header:ty;
        record = $record:ty;
        fields = { $( $field:ident : $ftype:ty ),+ $(,)? }
    ) => {
        $(#[$meta])*
        $vis struct $rings {
            name: ::std::string::String,
            len: usize,
            mapper_name: ::std::option::Option<&'static str>,
            $( pub $field: $crate::ring::Ring<$ftype, $header>, )+
        }

        /// A borrowed, per-field view returned by `slice`/`sliceFromTail`/
        /// `sliceToHead`, and the input shape accepted by `push_slice`.
        $vis struct $slice<$lt> {
            $( pub $field: &$lt [$ftype], )+
        }

        /// Per-field post-push counts, assembled by `push`.
        #[derive(Debug, Clone, Copy, Default)]
        $vis struct $pushed {
            $( pub $field: u64, )+
        }

        impl $rings {
            pub fn create(
                name: &str,
                length: usize,
                mapper_name: ::std::option::Option<&'static str>,
            ) -> $crate::error::RingResult<Self> {
                let sizes = [ $( ::std::mem::size_of::<$ftype>() ),+ ];
                let len = $crate::multi_ring::synchronized_element_count(&sizes, length);
                Ok(Self {
                    name: name.to_owned(),
                    len,
                    mapper_name,
                    $( $field: $crate::ring::Ring::create(
                        &format!("{}-{}", name, stringify!($field)),
                        len,
                        mapper_name,
                    )?, )+
                })
            }

            pub fn open(
                name: &str,
                length: usize,
                access: $crate::mapper::Access,
                mapper_name: ::std::option::Option<&'static str>,
            ) -> $crate::error::RingResult<Self> {
                let sizes = [ $( ::std::mem::size_of::<$ftype>() ),+ ];
                let len = $crate::multi_ring::synchronized_element_count(&sizes, length);
                Ok(Self {
                    name: name.to_owned(),
                    len,
                    mapper_name,
                    $( $field: $crate::ring::Ring::open(
                        &format!("{}-{}", name, stringify!($field)),
                        len,
                        access,
                        mapper_name,
                    )?, )+
                })
            }

            /// Closes every sub-ring. §4.4 gives no joint-failure
            /// semantics; this stops at the first error, leaving any
            /// remaining sub-rings open (callers may retry `close` on the
            /// individual `Ring` fields that were not reached).
            pub fn close(self) -> $crate::error::RingResult<()> {
                $( self.$field.close()?; )+
                Ok(())
            }

            pub fn name(&self) -> &str {
                &self.name
            }

            /// The shared element count across all sub-rings.
            pub fn len(&self) -> usize {
                self.len
            }

            pub fn is_empty(&self) -> bool {
                self.len == 0
            }

            /// Delegates `push(rec.F_i)` to each sub-ring `i` and
            /// assembles the resulting counts (`spec.md` §4.4 `push`).
            pub fn push(&mut self, rec: $record) -> $pushed {
                $pushed {
                    $( $field: self.$field.push(rec.$field), )+
                }
            }

            /// Pushes each record in turn, record-ordered (§4.4
            /// `pushValues`).
            pub fn push_values(&mut self, recs: &[$record]) -> ::std::vec::Vec<$pushed>
            where
                $record: ::std::marker::Copy,
            {
                recs.iter().map(|r| self.push(*r)).collect()
            }

            /// Columnar bulk push: delegates `push_values(cols.F_i)` to
            /// each sub-ring (§4.4 `pushSlice`).
            pub fn push_slice(&mut self, cols: $slice<'_>) -> $crate::error::RingResult<$pushed> {
                Ok($pushed {
                    $( $field: self.$field.push_values(cols.$field)?, )+
                })
            }

            pub fn slice(&self, start: u64, stop: u64) -> $crate::error::RingResult<$slice<'_>> {
                Ok($slice {
                    $( $field: self.$field.slice(start, stop)?, )+
                })
            }

            pub fn slice_from_tail(&self, k: u64) -> $crate::error::RingResult<$slice<'_>> {
                Ok($slice {
                    $( $field: self.$field.slice_from_tail(k)?, )+
                })
            }

            pub fn slice_to_head(&self, k: u64) -> $crate::error::RingResult<$slice<'_>> {
                Ok($slice {
                    $( $field: self.$field.slice_to_head(k)?, )+
                })
            }

            /// Whether a multi-ring named `name` currently exists: true
            /// iff every per-field sub-ring exists (§8 scenario F applied
            /// field-by-field).
            pub fn exists(
                name: &str,
                mapper_name: ::std::option::Option<&'static str>,
            ) -> $crate::error::RingResult<bool> {
                let mut all = true;
                $(
                    all &= $crate::ring::Ring::<$ftype, $header>::exists(
                        &format!("{}-{}", name, stringify!($field)),
                        mapper_name,
                    )?;
                )+
                Ok(all)
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gcd_lcm_basic() {
        assert_eq!(gcd(12, 18), 6);
        assert_eq!(lcm(4, 6), 12);
        assert_eq!(gcd(7, 0), 7);
    }

    #[test]
    fn synchronized_count_respects_granularity() {
        // With a 4096-byte granularity and an 8-byte field, r = 4096 / gcd(4096, 8) = 512.
        let m = synchronized_element_count(&[8], 1);
        assert_eq!(m % 512, 0);
        assert!(m >= 1);
    }

    #[test]
    fn synchronized_count_scales_with_request() {
        let m = synchronized_element_count(&[8], 1);
        let bigger = synchronized_element_count(&[8], m * 3 + 1);
        assert_eq!(bigger, m * 4);
    }

    #[test]
    fn synchronized_count_combines_multiple_fields() {
        let m = synchronized_element_count(&[8, 8, 8], 1);
        let m_one = synchronized_element_count(&[8], 1);
        assert_eq!(m, m_one);
    }
}
