//! Formula evaluation for [`MemoryHost`](super::MemoryHost).

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::address::{Address, RangeRef};
use crate::formula::{BinaryOp, Expr, Reference, UnaryOp};
use crate::value::CellValue;

/// Error sentinel shorthand.
fn error(code: &str) -> CellValue {
    CellValue::Error(code.to_string())
}

/// An evaluated argument: one value, or the used cells of a range.
enum Operand {
    Scalar(CellValue),
    Cells(Vec<CellValue>),
}

/// Evaluates expressions against a map of current cell values. Cells missing
/// from the map are blank.
pub(super) struct Evaluator<'a> {
    values: &'a BTreeMap<Address, CellValue>,
}

impl<'a> Evaluator<'a> {
    pub(super) fn new(values: &'a BTreeMap<Address, CellValue>) -> Self {
        Self { values }
    }

    pub(super) fn evaluate(&self, expr: &Expr) -> CellValue {
        self.scalar(expr)
    }

    fn cell(&self, address: &Address) -> CellValue {
        self.values.get(address).cloned().unwrap_or_default()
    }

    fn range(&self, range: &RangeRef) -> Vec<CellValue> {
        (range.first_column..=range.last_column)
            .flat_map(|column| {
                self.values
                    .range(
                        Address::new(range.sheet.as_str(), column, range.first_row)
                            ..=Address::new(range.sheet.as_str(), column, range.last_row),
                    )
                    .map(|(_, value)| value.clone())
            })
            .collect()
    }

    fn operand(&self, expr: &Expr) -> Operand {
        match expr {
            Expr::Ref(Reference::Range(range)) => Operand::Cells(self.range(range)),
            other => Operand::Scalar(self.scalar(other)),
        }
    }

    fn scalar(&self, expr: &Expr) -> CellValue {
        match expr {
            Expr::Number(n) => CellValue::Number(*n),
            Expr::Text(s) => CellValue::Text(s.clone()),
            Expr::Bool(b) => CellValue::Bool(*b),
            Expr::Error(code) => CellValue::Error(code.clone()),
            Expr::Ref(Reference::Cell(address)) => self.cell(address),
            // No implicit intersection.
            Expr::Ref(Reference::Range(_)) => error("#VALUE!"),
            Expr::Unary { op, operand } => self.unary(*op, operand),
            Expr::Binary { op, lhs, rhs } => self.binary(*op, lhs, rhs),
            Expr::Call { name, args } => self.call(name, args),
        }
    }

    fn unary(&self, op: UnaryOp, operand: &Expr) -> CellValue {
        let n = match to_number(&self.scalar(operand)) {
            Ok(n) => n,
            Err(e) => return e,
        };
        match op {
            UnaryOp::Plus => CellValue::Number(n),
            UnaryOp::Neg => CellValue::Number(-n),
            UnaryOp::Percent => CellValue::Number(n / 100.0),
        }
    }

    fn binary(&self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> CellValue {
        let left = self.scalar(lhs);
        let right = self.scalar(rhs);
        if left.is_error() {
            return left;
        }
        if right.is_error() {
            return right;
        }

        match op {
            BinaryOp::Concat => CellValue::Text(format!("{left}{right}")),
            BinaryOp::Eq => CellValue::Bool(compare(&left, &right) == Ordering::Equal),
            BinaryOp::Ne => CellValue::Bool(compare(&left, &right) != Ordering::Equal),
            BinaryOp::Lt => CellValue::Bool(compare(&left, &right) == Ordering::Less),
            BinaryOp::Le => CellValue::Bool(compare(&left, &right) != Ordering::Greater),
            BinaryOp::Gt => CellValue::Bool(compare(&left, &right) == Ordering::Greater),
            BinaryOp::Ge => CellValue::Bool(compare(&left, &right) != Ordering::Less),
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Pow => {
                let (a, b) = match (to_number(&left), to_number(&right)) {
                    (Ok(a), Ok(b)) => (a, b),
                    (Err(e), _) | (_, Err(e)) => return e,
                };
                let result = match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div if b == 0.0 => return error("#DIV/0!"),
                    BinaryOp::Div => a / b,
                    _ => a.powf(b),
                };
                number(result)
            }
        }
    }

    fn call(&self, name: &str, args: &[Expr]) -> CellValue {
        match name {
            "SUM" => self.aggregate(args, |ns| Some(ns.iter().sum())),
            "PRODUCT" => self.aggregate(args, |ns| {
                Some(if ns.is_empty() { 0.0 } else { ns.iter().product() })
            }),
            "AVERAGE" => self.aggregate(args, |ns| {
                #[allow(clippy::cast_precision_loss)]
                let len = ns.len() as f64;
                (!ns.is_empty()).then(|| ns.iter().sum::<f64>() / len)
            }),
            "MIN" => self.aggregate(args, |ns| Some(ns.iter().copied().reduce(f64::min).unwrap_or(0.0))),
            "MAX" => self.aggregate(args, |ns| Some(ns.iter().copied().reduce(f64::max).unwrap_or(0.0))),
            "COUNT" => self.count(args),
            "ABS" => self.unary_math(args, |n| Some(n.abs())),
            "SQRT" => self.unary_math(args, |n| (n >= 0.0).then(|| n.sqrt())),
            "ROUND" => self.round(args),
            "IF" => self.if_(args),
            _ => error("#NAME?"),
        }
    }

    /// Numbers from every argument. Range cells holding text, booleans or
    /// blanks are skipped; direct arguments are coerced.
    fn numbers(&self, args: &[Expr]) -> Result<Vec<f64>, CellValue> {
        let mut out = Vec::new();
        for arg in args {
            match self.operand(arg) {
                Operand::Cells(cells) => {
                    for cell in cells {
                        match cell {
                            CellValue::Number(n) => out.push(n),
                            CellValue::Error(_) => return Err(cell),
                            _ => {}
                        }
                    }
                }
                Operand::Scalar(value) => out.push(to_number(&value)?),
            }
        }
        Ok(out)
    }

    fn aggregate(&self, args: &[Expr], reduce: impl Fn(&[f64]) -> Option<f64>) -> CellValue {
        match self.numbers(args) {
            Ok(ns) => reduce(&ns).map_or_else(|| error("#DIV/0!"), number),
            Err(e) => e,
        }
    }

    fn count(&self, args: &[Expr]) -> CellValue {
        let mut count = 0_u32;
        for arg in args {
            match self.operand(arg) {
                Operand::Cells(cells) => {
                    count += cells.iter().map(|c| u32::from(c.is_number())).sum::<u32>();
                }
                Operand::Scalar(value) => count += u32::from(to_number(&value).is_ok()),
            }
        }
        CellValue::Number(f64::from(count))
    }

    fn unary_math(&self, args: &[Expr], f: impl Fn(f64) -> Option<f64>) -> CellValue {
        let [arg] = args else {
            return error("#VALUE!");
        };
        match to_number(&self.scalar(arg)) {
            Ok(n) => f(n).map_or_else(|| error("#NUM!"), number),
            Err(e) => e,
        }
    }

    fn round(&self, args: &[Expr]) -> CellValue {
        let (value, digits) = match args {
            [value] => (value, None),
            [value, digits] => (value, Some(digits)),
            _ => return error("#VALUE!"),
        };
        let n = match to_number(&self.scalar(value)) {
            Ok(n) => n,
            Err(e) => return e,
        };
        let digits = match digits.map(|d| to_number(&self.scalar(d))) {
            None => 0.0,
            Some(Ok(d)) => d.trunc(),
            Some(Err(e)) => return e,
        };
        let scale = 10_f64.powf(digits);
        number((n * scale).round() / scale)
    }

    fn if_(&self, args: &[Expr]) -> CellValue {
        let (condition, then, otherwise) = match args {
            [c, t] => (c, t, None),
            [c, t, o] => (c, t, Some(o)),
            _ => return error("#VALUE!"),
        };
        let truth = match self.scalar(condition) {
            CellValue::Bool(b) => b,
            CellValue::Number(n) => n != 0.0,
            CellValue::Empty => false,
            CellValue::Text(_) => return error("#VALUE!"),
            e @ CellValue::Error(_) => return e,
        };
        match (truth, otherwise) {
            (true, _) => self.scalar(then),
            (false, Some(o)) => self.scalar(o),
            (false, None) => CellValue::Bool(false),
        }
    }
}

fn number(n: f64) -> CellValue {
    if n.is_finite() {
        CellValue::Number(n)
    } else {
        error("#NUM!")
    }
}

fn to_number(value: &CellValue) -> Result<f64, CellValue> {
    match value {
        CellValue::Text(s) => s.trim().parse::<f64>().map_err(|_| error("#VALUE!")),
        CellValue::Error(_) => Err(value.clone()),
        other => other.as_number().ok_or_else(|| error("#VALUE!")),
    }
}

/// Order used by comparison operators: numbers, then text
/// (case-insensitive), then booleans. Blanks take the other side's type.
fn compare(left: &CellValue, right: &CellValue) -> Ordering {
    fn rank(value: &CellValue) -> u8 {
        match value {
            CellValue::Text(_) => 1,
            CellValue::Bool(_) => 2,
            _ => 0,
        }
    }
    fn blank_as(other: &CellValue) -> CellValue {
        match other {
            CellValue::Text(_) => CellValue::Text(String::new()),
            CellValue::Bool(_) => CellValue::Bool(false),
            _ => CellValue::Number(0.0),
        }
    }

    let left = if *left == CellValue::Empty { blank_as(right) } else { left.clone() };
    let right = if *right == CellValue::Empty { blank_as(&left) } else { right.clone() };

    match (&left, &right) {
        (CellValue::Text(a), CellValue::Text(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
        (CellValue::Bool(a), CellValue::Bool(b)) => a.cmp(b),
        (CellValue::Number(a), CellValue::Number(b)) => a.total_cmp(b),
        _ => rank(&left).cmp(&rank(&right)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula;
    use rstest::rstest;

    fn eval(text: &str) -> CellValue {
        let mut values = BTreeMap::new();
        values.insert(Address::new("Sheet1", 1, 1), CellValue::Number(1.0));
        values.insert(Address::new("Sheet1", 1, 2), CellValue::Number(2.0));
        values.insert(Address::new("Sheet1", 1, 3), CellValue::Text("x".into()));
        values.insert(Address::new("Sheet1", 1, 4), CellValue::Number(3.0));
        values.insert(Address::new("Sheet1", 2, 1), CellValue::Error("#N/A".into()));
        let expr = formula::parse(text, "Sheet1").unwrap();
        Evaluator::new(&values).evaluate(&expr)
    }

    #[rstest]
    #[case("=1+2*3", 7.0)]
    #[case("=(1+2)*3", 9.0)]
    #[case("=2^3^2", 64.0)]
    #[case("=-A1+A2", 1.0)]
    #[case("=50%", 0.5)]
    #[case("=SUM(A1:A4)", 6.0)]
    #[case("=AVERAGE(A1:A4)", 2.0)]
    #[case("=MIN(A1:A4)", 1.0)]
    #[case("=MAX(A1:A4,10)", 10.0)]
    #[case("=COUNT(A1:A4)", 3.0)]
    #[case("=PRODUCT(A1:A4)", 6.0)]
    #[case("=ABS(-4)", 4.0)]
    #[case("=SQRT(16)", 4.0)]
    #[case("=ROUND(1.26,1)", 1.3)]
    #[case("=IF(A1>A2,10,20)", 20.0)]
    #[case("=Z99+1", 1.0)]
    fn numeric_results(#[case] text: &str, #[case] expected: f64) {
        let CellValue::Number(n) = eval(text) else {
            panic!("{text} did not evaluate to a number");
        };
        assert!((n - expected).abs() < 1e-9, "{text} = {n}");
    }

    #[rstest]
    #[case("=1/0", "#DIV/0!")]
    #[case("=A3*2", "#VALUE!")]
    #[case("=B1+1", "#N/A")]
    #[case("=SUM(A1:B1)", "#N/A")]
    #[case("=SQRT(-1)", "#NUM!")]
    #[case("=NOPE(1)", "#NAME?")]
    #[case("=A1:A2+1", "#VALUE!")]
    #[case("=AVERAGE(A3)", "#VALUE!")]
    fn error_results(#[case] text: &str, #[case] code: &str) {
        assert_eq!(eval(text), CellValue::Error(code.into()));
    }

    #[test]
    fn text_and_comparison() {
        assert_eq!(eval("=\"a\"&A1"), CellValue::Text("a1".into()));
        assert_eq!(eval("=\"abc\"=\"ABC\""), CellValue::Bool(true));
        assert_eq!(eval("=A3>5"), CellValue::Bool(true));
    }
}
