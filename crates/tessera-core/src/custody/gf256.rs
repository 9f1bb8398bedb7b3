//! Arithmetic in GF(2^8) with the AES reduction polynomial `x^8 + x^4 + x^3 + x + 1`.
//!
//! Multiplication and division go through log/exp tables built at compile
//! time from the generator 3.

const REDUCTION: u16 = 0x11b;

struct Tables {
    exp: [u8; 255],
    log: [u8; 256],
}

const fn xtime(x: u8) -> u8 {
    let shifted = (x as u16) << 1;
    if shifted & 0x100 != 0 {
        (shifted ^ REDUCTION) as u8
    } else {
        shifted as u8
    }
}

const TABLES: Tables = {
    let mut exp = [0u8; 255];
    let mut log = [0u8; 256];
    let mut x: u8 = 1;
    let mut i = 0;
    while i < 255 {
        exp[i] = x;
        log[x as usize] = i as u8;
        // x * 3 == x * 2 + x
        x ^= xtime(x);
        i += 1;
    }
    Tables { exp, log }
};

pub fn add(a: u8, b: u8) -> u8 {
    a ^ b
}

pub fn mul(a: u8, b: u8) -> u8 {
    if a == 0 || b == 0 {
        return 0;
    }
    let sum = TABLES.log[a as usize] as usize + TABLES.log[b as usize] as usize;
    TABLES.exp[sum % 255]
}

/// `a / b`, or `None` when `b` is zero.
pub fn div(a: u8, b: u8) -> Option<u8> {
    if b == 0 {
        return None;
    }
    if a == 0 {
        return Some(0);
    }
    let diff = 255 + TABLES.log[a as usize] as usize - TABLES.log[b as usize] as usize;
    Some(TABLES.exp[diff % 255])
}

/// Evaluates the polynomial with `coefficients[0]` as constant term at `x`.
pub fn eval(coefficients: &[u8], x: u8) -> u8 {
    coefficients
        .iter()
        .rev()
        .fold(0, |acc, &coefficient| add(mul(acc, x), coefficient))
}

/// Lagrange interpolation through `points` (distinct non-zero x), evaluated at `x`.
pub fn interpolate(points: &[(u8, u8)], x: u8) -> Option<u8> {
    let mut result = 0u8;
    for (i, &(xi, yi)) in points.iter().enumerate() {
        let mut basis = 1u8;
        for (j, &(xj, _)) in points.iter().enumerate() {
            if i == j {
                continue;
            }
            basis = mul(basis, div(add(x, xj), add(xi, xj))?);
        }
        result = add(result, mul(yi, basis));
    }
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_nonzero_element_has_an_inverse() {
        for a in 1..=255u8 {
            let inverse = div(1, a).unwrap();
            assert_eq!(mul(a, inverse), 1, "inverse of {a}");
        }
    }

    #[test]
    fn known_aes_products() {
        assert_eq!(mul(0x57, 0x83), 0xc1);
        assert_eq!(mul(0x57, 0x13), 0xfe);
        assert_eq!(mul(0, 0x13), 0);
    }

    #[test]
    fn division_undoes_multiplication() {
        for a in [0u8, 1, 2, 0x53, 0xca, 0xff] {
            for b in [1u8, 3, 0x8e, 0xff] {
                assert_eq!(div(mul(a, b), b), Some(a));
            }
        }
        assert_eq!(div(7, 0), None);
    }

    #[test]
    fn interpolation_recovers_constant_term() {
        let coefficients = [0x2a, 0x11, 0xc4];
        let points: Vec<(u8, u8)> = (1..=3).map(|x| (x, eval(&coefficients, x))).collect();

        assert_eq!(interpolate(&points, 0), Some(0x2a));
        assert_eq!(interpolate(&points, 5), Some(eval(&coefficients, 5)));
    }
}
