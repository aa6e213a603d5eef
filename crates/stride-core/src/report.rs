//! Plain-text run report: the inputs followed by the result vector.

use std::io::{self, Write};

use crate::types::{Matrix, Vector};

fn write_row<W: Write>(out: &mut W, values: &[f64]) -> io::Result<()> {
    let mut first = true;
    for x in values {
        if !first {
            write!(out, " ")?;
        }
        write!(out, "{x:.6}")?;
        first = false;
    }
    writeln!(out)
}

/// Write the generated matrix and vector.
pub fn write_inputs<W: Write>(out: &mut W, matrix: &Matrix, vector: &Vector) -> io::Result<()> {
    writeln!(out, "Generated matrix:")?;
    for i in 0..matrix.rows() {
        write_row(out, matrix.row(i))?;
    }
    writeln!(out)?;
    writeln!(out, "Generated vector:")?;
    write_row(out, vector.as_slice())?;
    writeln!(out)
}

/// Write the result, one value per line.
pub fn write_result<W: Write>(out: &mut W, result: &Vector) -> io::Result<()> {
    writeln!(out, "Resulting vector:")?;
    for x in result.as_slice() {
        writeln!(out, "{x:.6}")?;
    }
    Ok(())
}

/// Full report: inputs (when `show_inputs`) then the result.
pub fn write_report<W: Write>(
    out: &mut W,
    matrix: &Matrix,
    vector: &Vector,
    result: &Vector,
    show_inputs: bool,
) -> io::Result<()> {
    if show_inputs {
        write_inputs(out, matrix, vector)?;
    }
    write_result(out, result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_layout() {
        let a = Matrix::from_rows(&[[1.0, 2.0], [3.0, 4.0]]).unwrap();
        let v = Vector::new(vec![1.0, 0.5]).unwrap();
        let r = Vector::new(vec![2.0, 5.0]).unwrap();

        let mut buf = Vec::new();
        write_report(&mut buf, &a, &v, &r, true).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text,
            "Generated matrix:\n\
             1.000000 2.000000\n\
             3.000000 4.000000\n\
             \n\
             Generated vector:\n\
             1.000000 0.500000\n\
             \n\
             Resulting vector:\n\
             2.000000\n\
             5.000000\n"
        );
    }

    #[test]
    fn test_result_only() {
        let a = Matrix::identity(1).unwrap();
        let v = Vector::new(vec![3.0]).unwrap();
        let mut buf = Vec::new();
        write_report(&mut buf, &a, &v, &v, false).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "Resulting vector:\n3.000000\n");
    }
}
