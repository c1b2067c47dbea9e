//! Value types and concrete tensor payloads.
//!
//! `Type` describes what a `Value` carries at trace time. The target format
//! understands only tensors, so the pass pipeline progressively eliminates
//! every other variant: scalars become 0-d tensors (`EraseScalarsPass`),
//! tuples are flattened away (`LowerTuplesPass`), and tensor lists survive
//! only between a `ListConstruct` and its consumer.
//!
//! `TensorData` is the literal payload attached to constant nodes and stored
//! in the parameter table. It implements exactly the kernels the folding and
//! constant-propagation passes interpret: narrow, concat, unsqueeze, permute,
//! and same-shape elementwise arithmetic.

use std::fmt;

/// Element data types representable in the target format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    F32,
    F64,
    I32,
    I64,
    Bool,
}

impl DType {
    pub fn is_float(self) -> bool {
        matches!(self, DType::F32 | DType::F64)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DType::F32 => "f32",
            DType::F64 => "f64",
            DType::I32 => "i32",
            DType::I64 => "i64",
            DType::Bool => "bool",
        };
        f.write_str(s)
    }
}

/// The type of a `Value`.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    /// A tensor; dtype and shape are optional because a freshly traced graph
    /// may not carry complete type information for every edge.
    Tensor {
        dtype: Option<DType>,
        shape: Option<Vec<i64>>,
    },
    /// Scalar number types. Erased before translation.
    Int,
    Float,
    Bool,
    /// A list of tensors (between `ListConstruct` and its consumer).
    TensorList,
    /// A tuple. Lowered away before translation.
    Tuple(Vec<Type>),
    /// The "no value" marker.
    None,
    /// No type information recorded.
    Unknown,
}

impl Type {
    /// A tensor type with no dtype or shape information.
    pub fn tensor() -> Type {
        Type::Tensor {
            dtype: None,
            shape: None,
        }
    }

    /// A fully specified tensor type.
    pub fn tensor_of(dtype: DType, shape: Vec<i64>) -> Type {
        Type::Tensor {
            dtype: Some(dtype),
            shape: Some(shape),
        }
    }

    pub fn is_tensor(&self) -> bool {
        matches!(self, Type::Tensor { .. })
    }

    /// True for the scalar number types the target format cannot represent.
    pub fn is_scalar_number(&self) -> bool {
        matches!(self, Type::Int | Type::Float | Type::Bool)
    }

    /// True if this is a tensor known to have a floating-point dtype.
    pub fn is_float_tensor(&self) -> bool {
        matches!(
            self,
            Type::Tensor {
                dtype: Some(d),
                ..
            } if d.is_float()
        )
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Tensor { dtype, shape } => {
                write!(f, "Tensor")?;
                if let Some(d) = dtype {
                    write!(f, "<{}>", d)?;
                }
                if let Some(s) = shape {
                    write!(f, "{:?}", s)?;
                }
                Ok(())
            }
            Type::Int => f.write_str("Int"),
            Type::Float => f.write_str("Float"),
            Type::Bool => f.write_str("Bool"),
            Type::TensorList => f.write_str("Tensor[]"),
            Type::Tuple(elems) => {
                f.write_str("(")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                f.write_str(")")
            }
            Type::None => f.write_str("None"),
            Type::Unknown => f.write_str("?"),
        }
    }
}

// ---------------------------------------------------------------------------
// TensorData
// ---------------------------------------------------------------------------

/// Typed element storage for a concrete tensor.
#[derive(Debug, Clone, PartialEq)]
pub enum Elems {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    Bool(Vec<bool>),
}

impl Elems {
    fn len(&self) -> usize {
        match self {
            Elems::F32(v) => v.len(),
            Elems::F64(v) => v.len(),
            Elems::I32(v) => v.len(),
            Elems::I64(v) => v.len(),
            Elems::Bool(v) => v.len(),
        }
    }
}

/// A concrete tensor value: a trained weight, a traced literal, or the
/// result of folding a constant subgraph.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorData {
    shape: Vec<i64>,
    elems: Elems,
}

impl TensorData {
    /// Builds a tensor from elements and a shape.
    /// Returns `Err` if the element count does not match the shape.
    pub fn new(elems: Elems, shape: Vec<i64>) -> Result<TensorData, String> {
        let expect: i64 = shape.iter().product();
        if expect < 0 || elems.len() != expect as usize {
            return Err(format!(
                "shape {:?} requires {} elements, got {}",
                shape,
                expect,
                elems.len()
            ));
        }
        Ok(TensorData { shape, elems })
    }

    pub fn from_f32s(data: Vec<f32>, shape: Vec<i64>) -> Result<TensorData, String> {
        TensorData::new(Elems::F32(data), shape)
    }

    pub fn from_i64s(data: Vec<i64>, shape: Vec<i64>) -> Result<TensorData, String> {
        TensorData::new(Elems::I64(data), shape)
    }

    /// A 0-d (scalar) tensor.
    pub fn scalar_f32(v: f32) -> TensorData {
        TensorData {
            shape: Vec::new(),
            elems: Elems::F32(vec![v]),
        }
    }

    /// A 0-d (scalar) tensor.
    pub fn scalar_i64(v: i64) -> TensorData {
        TensorData {
            shape: Vec::new(),
            elems: Elems::I64(vec![v]),
        }
    }

    /// Stacks an integer list into a 1-d tensor (how integer-list literals
    /// are represented in the target format).
    pub fn stack_i64s(values: &[i64]) -> TensorData {
        TensorData {
            shape: vec![values.len() as i64],
            elems: Elems::I64(values.to_vec()),
        }
    }

    pub fn dtype(&self) -> DType {
        match &self.elems {
            Elems::F32(_) => DType::F32,
            Elems::F64(_) => DType::F64,
            Elems::I32(_) => DType::I32,
            Elems::I64(_) => DType::I64,
            Elems::Bool(_) => DType::Bool,
        }
    }

    pub fn shape(&self) -> &[i64] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn numel(&self) -> usize {
        self.elems.len()
    }

    pub fn elems(&self) -> &Elems {
        &self.elems
    }

    /// The value type describing this tensor.
    pub fn value_type(&self) -> Type {
        Type::tensor_of(self.dtype(), self.shape.clone())
    }

    // -- index plumbing ----------------------------------------------------

    /// Row-major strides for the current shape.
    fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1usize; self.shape.len()];
        for i in (0..self.shape.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * self.shape[i + 1] as usize;
        }
        strides
    }

    /// Builds a new tensor by picking `indices` (linear, row-major) out of
    /// this tensor's storage.
    fn gather(&self, indices: &[usize], shape: Vec<i64>) -> TensorData {
        let elems = match &self.elems {
            Elems::F32(v) => Elems::F32(indices.iter().map(|&i| v[i]).collect()),
            Elems::F64(v) => Elems::F64(indices.iter().map(|&i| v[i]).collect()),
            Elems::I32(v) => Elems::I32(indices.iter().map(|&i| v[i]).collect()),
            Elems::I64(v) => Elems::I64(indices.iter().map(|&i| v[i]).collect()),
            Elems::Bool(v) => Elems::Bool(indices.iter().map(|&i| v[i]).collect()),
        };
        TensorData { shape, elems }
    }

    /// Resolves a possibly negative axis against `rank` (with `extra` slots
    /// allowed past the end, for unsqueeze-style insertion points).
    fn resolve_axis(axis: i64, rank: usize, extra: usize) -> Result<usize, String> {
        let bound = (rank + extra) as i64;
        let resolved = if axis < 0 { axis + bound } else { axis };
        if resolved < 0 || resolved >= bound {
            return Err(format!("axis {} out of range for rank {}", axis, rank));
        }
        Ok(resolved as usize)
    }

    // -- folding kernels ---------------------------------------------------

    /// Returns the sub-tensor of length `len` starting at `start` along `dim`.
    pub fn narrow(&self, dim: i64, start: i64, len: i64) -> Result<TensorData, String> {
        let dim = Self::resolve_axis(dim, self.rank(), 0)?;
        let size = self.shape[dim];
        let start = if start < 0 { start + size } else { start };
        if start < 0 || len < 0 || start + len > size {
            return Err(format!(
                "narrow range [{}, {}) out of bounds for dimension of size {}",
                start,
                start + len,
                size
            ));
        }
        let mut shape = self.shape.clone();
        shape[dim] = len;

        let strides = self.strides();
        let mut indices = Vec::with_capacity(shape.iter().product::<i64>() as usize);
        collect_region(&self.shape, &strides, dim, start as usize, len as usize, &mut indices);
        Ok(self.gather(&indices, shape))
    }

    /// Concatenates `parts` along `axis`. All parts must share dtype and all
    /// dimensions other than `axis`.
    pub fn concat(parts: &[&TensorData], axis: i64) -> Result<TensorData, String> {
        let first = parts
            .first()
            .ok_or_else(|| "concat of zero tensors".to_owned())?;
        let axis = Self::resolve_axis(axis, first.rank(), 0)?;
        let mut out_shape = first.shape.clone();
        for part in &parts[1..] {
            if part.dtype() != first.dtype() {
                return Err("concat of tensors with differing dtypes".into());
            }
            if part.rank() != first.rank() {
                return Err("concat of tensors with differing ranks".into());
            }
            for (d, (&a, &b)) in first.shape.iter().zip(part.shape.iter()).enumerate() {
                if d != axis && a != b {
                    return Err(format!(
                        "concat shape mismatch at dimension {}: {} vs {}",
                        d, a, b
                    ));
                }
            }
            out_shape[axis] += part.shape[axis];
        }

        // Walk the output in row-major order; each multi-index maps into
        // exactly one part.
        let total: usize = out_shape.iter().product::<i64>() as usize;
        let mut elems = match first.dtype() {
            DType::F32 => Elems::F32(Vec::with_capacity(total)),
            DType::F64 => Elems::F64(Vec::with_capacity(total)),
            DType::I32 => Elems::I32(Vec::with_capacity(total)),
            DType::I64 => Elems::I64(Vec::with_capacity(total)),
            DType::Bool => Elems::Bool(Vec::with_capacity(total)),
        };
        let mut index = vec![0i64; out_shape.len()];
        for _ in 0..total {
            // Locate the part owning this index along `axis`.
            let mut offset = index[axis];
            let mut part: &TensorData = first;
            for &p in parts {
                if offset < p.shape[axis] {
                    part = p;
                    break;
                }
                offset -= p.shape[axis];
            }
            let strides = part.strides();
            let mut linear = 0usize;
            for d in 0..out_shape.len() {
                let coord = if d == axis { offset } else { index[d] };
                linear += coord as usize * strides[d];
            }
            push_elem(&mut elems, &part.elems, linear);
            // Advance the row-major multi-index.
            for d in (0..out_shape.len()).rev() {
                index[d] += 1;
                if index[d] < out_shape[d] {
                    break;
                }
                index[d] = 0;
            }
        }
        Ok(TensorData {
            shape: out_shape,
            elems,
        })
    }

    /// Inserts a size-1 dimension at `dim` (negative dims count from the end,
    /// with one extra slot past the last dimension).
    pub fn unsqueeze(&self, dim: i64) -> Result<TensorData, String> {
        let dim = Self::resolve_axis(dim, self.rank(), 1)?;
        let mut shape = self.shape.clone();
        shape.insert(dim, 1);
        Ok(TensorData {
            shape,
            elems: self.elems.clone(),
        })
    }

    /// Permutes dimensions: output dimension `i` is input dimension `perm[i]`.
    pub fn permute(&self, perm: &[i64]) -> Result<TensorData, String> {
        if perm.len() != self.rank() {
            return Err(format!(
                "permutation {:?} does not match tensor rank {}",
                perm,
                self.rank()
            ));
        }
        let mut seen = vec![false; perm.len()];
        let mut axes = Vec::with_capacity(perm.len());
        for &p in perm {
            let axis = Self::resolve_axis(p, self.rank(), 0)?;
            if seen[axis] {
                return Err(format!("permutation {:?} repeats axis {}", perm, axis));
            }
            seen[axis] = true;
            axes.push(axis);
        }

        let out_shape: Vec<i64> = axes.iter().map(|&a| self.shape[a]).collect();
        let in_strides = self.strides();
        let total: usize = out_shape.iter().product::<i64>() as usize;
        let mut indices = Vec::with_capacity(total);
        let mut index = vec![0i64; out_shape.len()];
        for _ in 0..total {
            let mut linear = 0usize;
            for (d, &axis) in axes.iter().enumerate() {
                linear += index[d] as usize * in_strides[axis];
            }
            indices.push(linear);
            for d in (0..out_shape.len()).rev() {
                index[d] += 1;
                if index[d] < out_shape[d] {
                    break;
                }
                index[d] = 0;
            }
        }
        Ok(self.gather(&indices, out_shape))
    }

    // -- elementwise kernels (constant propagation) ------------------------

    /// Same-shape elementwise binary arithmetic. `Div` on integer elements
    /// and division by zero both return `Err` so callers can skip folding.
    pub fn elementwise(&self, other: &TensorData, op: ArithOp) -> Result<TensorData, String> {
        if self.shape != other.shape {
            return Err(format!(
                "elementwise {:?} on mismatched shapes {:?} vs {:?}",
                op, self.shape, other.shape
            ));
        }
        let elems = match (&self.elems, &other.elems) {
            (Elems::F32(a), Elems::F32(b)) => Elems::F32(zip_f32(a, b, op)?),
            (Elems::F64(a), Elems::F64(b)) => Elems::F64(zip_f64(a, b, op)?),
            (Elems::I32(a), Elems::I32(b)) => Elems::I32(zip_i32(a, b, op)?),
            (Elems::I64(a), Elems::I64(b)) => Elems::I64(zip_i64(a, b, op)?),
            _ => {
                return Err(format!(
                    "elementwise {:?} on mismatched or non-numeric dtypes",
                    op
                ))
            }
        };
        Ok(TensorData {
            shape: self.shape.clone(),
            elems,
        })
    }

    /// Elementwise negation.
    pub fn neg(&self) -> Result<TensorData, String> {
        let elems = match &self.elems {
            Elems::F32(v) => Elems::F32(v.iter().map(|x| -x).collect()),
            Elems::F64(v) => Elems::F64(v.iter().map(|x| -x).collect()),
            Elems::I32(v) => Elems::I32(v.iter().map(|x| x.wrapping_neg()).collect()),
            Elems::I64(v) => Elems::I64(v.iter().map(|x| x.wrapping_neg()).collect()),
            Elems::Bool(_) => return Err("cannot negate a bool tensor".into()),
        };
        Ok(TensorData {
            shape: self.shape.clone(),
            elems,
        })
    }

    // -- serialization -----------------------------------------------------

    /// Little-endian raw bytes of the element storage, in row-major order
    /// (the layout the container format's raw-data field expects).
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match &self.elems {
            Elems::F32(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Elems::F64(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Elems::I32(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Elems::I64(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Elems::Bool(v) => v.iter().map(|&x| x as u8).collect(),
        }
    }
}

impl fmt::Display for TensorData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tensor<{}>{:?}", self.dtype(), self.shape)
    }
}

/// Binary arithmetic operators interpretable during constant propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

// ---------------------------------------------------------------------------
// Elementwise helpers
// ---------------------------------------------------------------------------

fn zip_f32(a: &[f32], b: &[f32], op: ArithOp) -> Result<Vec<f32>, String> {
    if op == ArithOp::Div && b.iter().any(|&x| x == 0.0) {
        return Err("division by zero".into());
    }
    Ok(a.iter()
        .zip(b)
        .map(|(&x, &y)| match op {
            ArithOp::Add => x + y,
            ArithOp::Sub => x - y,
            ArithOp::Mul => x * y,
            ArithOp::Div => x / y,
        })
        .collect())
}

fn zip_f64(a: &[f64], b: &[f64], op: ArithOp) -> Result<Vec<f64>, String> {
    if op == ArithOp::Div && b.iter().any(|&x| x == 0.0) {
        return Err("division by zero".into());
    }
    Ok(a.iter()
        .zip(b)
        .map(|(&x, &y)| match op {
            ArithOp::Add => x + y,
            ArithOp::Sub => x - y,
            ArithOp::Mul => x * y,
            ArithOp::Div => x / y,
        })
        .collect())
}

fn zip_i32(a: &[i32], b: &[i32], op: ArithOp) -> Result<Vec<i32>, String> {
    if op == ArithOp::Div {
        // Integer division has different promotion rules in the target
        // format; the division-legalization pass casts first.
        return Err("integer division is not folded".into());
    }
    Ok(a.iter()
        .zip(b)
        .map(|(&x, &y)| match op {
            ArithOp::Add => x.wrapping_add(y),
            ArithOp::Sub => x.wrapping_sub(y),
            ArithOp::Mul => x.wrapping_mul(y),
            ArithOp::Div => unreachable!(),
        })
        .collect())
}

fn zip_i64(a: &[i64], b: &[i64], op: ArithOp) -> Result<Vec<i64>, String> {
    if op == ArithOp::Div {
        return Err("integer division is not folded".into());
    }
    Ok(a.iter()
        .zip(b)
        .map(|(&x, &y)| match op {
            ArithOp::Add => x.wrapping_add(y),
            ArithOp::Sub => x.wrapping_sub(y),
            ArithOp::Mul => x.wrapping_mul(y),
            ArithOp::Div => unreachable!(),
        })
        .collect())
}

/// Appends element `index` of `src` onto `dst` (same dtype).
fn push_elem(dst: &mut Elems, src: &Elems, index: usize) {
    match (dst, src) {
        (Elems::F32(d), Elems::F32(s)) => d.push(s[index]),
        (Elems::F64(d), Elems::F64(s)) => d.push(s[index]),
        (Elems::I32(d), Elems::I32(s)) => d.push(s[index]),
        (Elems::I64(d), Elems::I64(s)) => d.push(s[index]),
        (Elems::Bool(d), Elems::Bool(s)) => d.push(s[index]),
        _ => unreachable!("concat parts checked for matching dtype"),
    }
}

/// Collects linear indices of the region `[start, start+len)` along `dim`,
/// full range along every other dimension, in row-major output order.
fn collect_region(
    shape: &[i64],
    strides: &[usize],
    dim: usize,
    start: usize,
    len: usize,
    out: &mut Vec<usize>,
) {
    let mut index = vec![0usize; shape.len()];
    index[dim] = start;
    let total: usize = shape
        .iter()
        .enumerate()
        .map(|(d, &s)| if d == dim { len } else { s as usize })
        .product();
    for _ in 0..total {
        out.push(index.iter().zip(strides).map(|(&i, &s)| i * s).sum());
        for d in (0..shape.len()).rev() {
            index[d] += 1;
            let limit = if d == dim {
                start + len
            } else {
                shape[d] as usize
            };
            if index[d] < limit {
                break;
            }
            index[d] = if d == dim { start } else { 0 };
        }
    }
}
