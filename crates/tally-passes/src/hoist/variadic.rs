//! Regrouping of variadic operands.
//!
//! All functions here receive the operands already processed bottom-up and
//! the destination of the variadic node itself. An operand whose own
//! destination is shallower is *pulled*: it can be evaluated further out.

use std::mem;

use tally_bound::{BitSet, DType, Node, NodeVec, VariadicFamily, VariadicOp};

use super::Hoister;
use super::info::HoistInfo;

/// An operand together with its inversion flag.
struct Operand {
    info: HoistInfo,
    inverted: bool,
}

impl Hoister<'_> {
    /// Rebuild a variadic node after regrouping its operands. Returns `node`
    /// itself when nothing changed.
    pub(super) fn hoist_variadic(
        &mut self,
        node: &Node,
        op: VariadicOp,
        inverted: &BitSet,
        infos: Vec<HoistInfo>,
        dest: usize,
    ) -> Node {
        let count = infos.len();
        let operands: Vec<Operand> = infos
            .into_iter()
            .enumerate()
            .map(|(i, info)| Operand {
                info,
                inverted: inverted.contains(i),
            })
            .collect();
        let ty = node.ty();
        let operands = match op.family(ty) {
            VariadicFamily::Commutative => self.commutative(op, ty, operands, dest),
            VariadicFamily::Associative => self.associative(op, ty, operands, dest),
            VariadicFamily::Ordered => self.ordered(op, ty, operands, dest),
            VariadicFamily::NonAssociative => self.individually(operands, dest),
        };

        if operands.len() == count && !operands.iter().any(|o| o.info.changed) {
            return node.clone();
        }
        let bits: BitSet = operands
            .iter()
            .enumerate()
            .filter(|(_, o)| o.inverted)
            .map(|(i, _)| i)
            .collect();
        Node::variadic(op, operands.into_iter().map(|o| o.info.node), bits, ty.clone())
    }

    fn individually(&mut self, operands: Vec<Operand>, dest: usize) -> Vec<Operand> {
        operands
            .into_iter()
            .map(|o| Operand {
                info: self.hoist_individually(o.info, dest),
                inverted: o.inverted,
            })
            .collect()
    }

    /// Reorderable operators: every pulled operand leaves, grouped per
    /// destination from the outermost in. Each group's binding takes the
    /// previous group's reference as its first operand, and the last
    /// reference takes the place of the first pulled operand.
    fn commutative(
        &mut self,
        op: VariadicOp,
        ty: &DType,
        operands: Vec<Operand>,
        dest: usize,
    ) -> Vec<Operand> {
        // Nothing may move across an operand that must stay put.
        if operands.iter().any(|o| o.info.prohibit) {
            return self.ordered(op, ty, operands, dest);
        }
        let pulled_count = operands.iter().filter(|o| o.info.dest < dest).count();
        if pulled_count < 2 {
            return self.individually(operands, dest);
        }

        let mut first = None;
        let mut kept = Vec::with_capacity(operands.len() - pulled_count + 1);
        let mut pulled = Vec::with_capacity(pulled_count);
        for o in operands {
            if o.info.dest < dest {
                first.get_or_insert(kept.len());
                pulled.push(o);
            } else {
                kept.push(o);
            }
        }
        pulled.sort_by_key(|o| o.info.dest);

        let mut carry: Option<Operand> = None;
        let mut pulled = pulled.into_iter().peekable();
        while let Some(head) = pulled.next() {
            let level = head.info.dest;
            let mut group: Vec<Operand> = carry.take().into_iter().collect();
            group.push(head);
            while let Some(next) = pulled.next_if(|o| o.info.dest == level) {
                group.push(next);
            }
            carry = Some(self.combine(op, ty, group, level));
        }
        if let Some(carry) = carry {
            kept.insert(first.unwrap_or(0), carry);
        }
        kept
    }

    /// Bind one commutative group at `level`.
    fn combine(
        &mut self,
        op: VariadicOp,
        ty: &DType,
        mut group: Vec<Operand>,
        level: usize,
    ) -> Operand {
        if group.len() == 1
            && let Some(single) = group.pop()
        {
            return self.single(single);
        }
        // Lead with a plain operand; a group of only inverted operands is
        // bound plain and referenced inverted.
        let negate = match group.iter().position(|o| !o.inverted) {
            Some(pos) => {
                if pos > 0 {
                    let lead = group.remove(pos);
                    group.insert(0, lead);
                }
                false
            }
            None => {
                for o in &mut group {
                    o.inverted = false;
                }
                true
            }
        };
        Operand {
            info: self.collapse(op, ty, group, level),
            inverted: negate,
        }
    }

    /// Rounding-sensitive operators: only a leading run may leave, and only
    /// as left-nested groups. Each time an operand needs a deeper level than
    /// the run so far, the run is bound and carried into the next one. An
    /// operand needing a shallower level than its run is bound there alone.
    fn associative(
        &mut self,
        op: VariadicOp,
        ty: &DType,
        operands: Vec<Operand>,
        dest: usize,
    ) -> Vec<Operand> {
        let prefix = operands
            .iter()
            .take_while(|o| !o.info.prohibit && o.info.dest < dest)
            .count();
        if prefix == 0 {
            return self.individually(operands, dest);
        }

        let mut rest = operands.into_iter();
        let mut carry: Option<Operand> = None;
        let mut run: Vec<Operand> = Vec::new();
        let mut run_dest = 0;
        for o in rest.by_ref().take(prefix) {
            if !run.is_empty() && o.info.dest > run_dest {
                carry = Some(self.collapse_run(op, ty, carry.take(), mem::take(&mut run), run_dest));
            }
            if run.is_empty() {
                run_dest = o.info.dest;
            }
            run.push(o);
        }
        let head = self.collapse_run(op, ty, carry, run, run_dest);

        let mut out = vec![head];
        out.extend(self.individually(rest.collect(), dest));
        out
    }

    fn collapse_run(
        &mut self,
        op: VariadicOp,
        ty: &DType,
        carry: Option<Operand>,
        run: Vec<Operand>,
        level: usize,
    ) -> Operand {
        let mut members = carry.into_iter().chain(run);
        let mut group: Vec<Operand> = members.next().into_iter().collect();
        // A later member invariant further out is bound at its own level
        // first; only its reference joins the run.
        for o in members {
            group.push(Operand {
                info: self.hoist_individually(o.info, level),
                inverted: o.inverted,
            });
        }
        if group.len() == 1
            && let Some(single) = group.pop()
        {
            return self.single(single);
        }
        Operand {
            info: self.collapse(op, ty, group, level),
            inverted: false,
        }
    }

    /// Order-preserving operators: any contiguous run of pulled operands
    /// may leave. Levels are processed from the outermost in, so a run bound
    /// at one level can join a longer run bound at a deeper one.
    fn ordered(
        &mut self,
        op: VariadicOp,
        ty: &DType,
        mut operands: Vec<Operand>,
        dest: usize,
    ) -> Vec<Operand> {
        let mut levels: Vec<usize> = operands
            .iter()
            .filter(|o| !o.info.prohibit && o.info.dest < dest)
            .map(|o| o.info.dest)
            .collect();
        levels.sort_unstable();
        levels.dedup();

        for level in levels {
            let mut out = Vec::with_capacity(operands.len());
            let mut run = Vec::new();
            for o in operands {
                if !o.info.prohibit && o.info.dest <= level {
                    run.push(o);
                    continue;
                }
                self.flush_run(op, ty, &mut run, level, &mut out);
                out.push(o);
            }
            self.flush_run(op, ty, &mut run, level, &mut out);
            operands = out;
        }
        operands
    }

    fn flush_run(
        &mut self,
        op: VariadicOp,
        ty: &DType,
        run: &mut Vec<Operand>,
        level: usize,
        out: &mut Vec<Operand>,
    ) {
        if run.len() >= 2 {
            let info = self.collapse(op, ty, mem::take(run), level);
            out.push(Operand {
                info,
                inverted: false,
            });
        } else if let Some(single) = run.pop() {
            // Operands pulled further out were settled at their own level.
            if single.info.dest == level {
                out.push(self.single(single));
            } else {
                out.push(single);
            }
        }
    }

    /// A lone operand is bound only when it is worth it; otherwise it stays
    /// in place (or is carried into the next group).
    fn single(&mut self, o: Operand) -> Operand {
        if o.info.inhibit {
            return o;
        }
        Operand {
            info: self.hoist_single(o.info),
            inverted: o.inverted,
        }
    }

    /// Bind `group` as one variadic value at `level`.
    fn collapse(
        &mut self,
        op: VariadicOp,
        ty: &DType,
        group: Vec<Operand>,
        level: usize,
    ) -> HoistInfo {
        let mut scopes = BitSet::new();
        let mut bits = BitSet::new();
        let mut args = NodeVec::with_capacity(group.len());
        for (i, o) in group.into_iter().enumerate() {
            scopes.union_with(&o.info.scopes);
            bits.set(i, o.inverted);
            args.push(o.info.node);
        }
        let value = Node::variadic(op, args, bits, ty.clone());
        let reference = self.materialize(&value, level);
        HoistInfo {
            node: reference,
            scopes,
            changed: true,
            dest: level,
            prohibit: false,
            inhibit: true,
        }
    }
}
